//! Input/Output operations for initial-guess runs
//!
//! This module handles logging setup and result tables.

mod output;

pub use output::{setup_output, write_step_table};
