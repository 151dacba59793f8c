//! Initial guesses for a real-space Kohn-Sham SCF solver
//!
//! The density guess starts from a superposition of atomic densities and, in
//! MD or relaxation runs, extrapolates the deviation from it along the ionic
//! trajectory. Orbitals start from reproducible pseudo-random values.

pub mod app;
pub mod comm;
pub mod config;
pub mod context;
pub mod density_impl;
pub mod grid;
pub mod history;
pub mod io;
pub mod lsq;
pub mod memory;
pub mod orbital_impl;
pub mod random;

pub use comm::{Participation, ProcessGroup, SerialGroup, ThreadGroup};
pub use context::{
    AtomicState, GuessParams, OrbitalSeeding, SingularHistoryPolicy, SolverContext,
    SpinPolarization, StepCounters, StructuralMode,
};
pub use density_impl::{
    extrapolate_density, init_electron_density, AtomicReference, ExtrapolationOutcome,
};
pub use grid::{DomainVertices, GridDescriptor, Integration};
pub use orbital_impl::{init_orbitals, OrbitalInit, OrbitalLayout, OrbitalSet};
