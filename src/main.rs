//! Initial-guess driver with YAML configuration
//!
//! Runs the density and orbital initial guesses over a sequence of structural
//! steps on simulated ranks and reports charge conservation.

use color_eyre::eyre::Result;
use scf_guess::app::GuessApplication;

fn main() -> Result<()> {
    color_eyre::install()?;
    GuessApplication::from_cli()?.run()
}
