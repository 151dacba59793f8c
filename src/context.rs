//! Solver state shared by the initial-guess components
//!
//! A `SolverContext` is created once per run by the driver, mutated in place at
//! every structural step and dropped at the end of the run.

extern crate nalgebra as na;

use crate::comm::ProcessGroup;
use crate::density_impl::{AtomicReference, DensityField, ExtrapolationState, Magnetization};
use crate::grid::{GridDescriptor, Integration};
use crate::orbital_impl::{OrbitalLayout, OrbitalSet};
use color_eyre::eyre::{ensure, Result};
use na::Vector3;
use serde::{Deserialize, Serialize};

/// Default lower bound for an extrapolated density value.
pub const DENSITY_FLOOR: f64 = 1e-14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpinPolarization {
    #[default]
    Unpolarized,
    /// One magnetization component
    Collinear,
    /// Three magnetization components, spinor orbitals
    NonCollinear,
}

impl SpinPolarization {
    pub fn is_polarized(self) -> bool {
        self != SpinPolarization::Unpolarized
    }

    /// Density channels stored per node: total, or total/up/down.
    pub fn density_channels(self) -> usize {
        match self {
            SpinPolarization::Unpolarized => 1,
            _ => 3,
        }
    }

    /// Magnetization channels stored per node: m, or |m|/mx/my/mz.
    pub fn magnetization_channels(self) -> usize {
        match self {
            SpinPolarization::Unpolarized => 0,
            SpinPolarization::Collinear => 1,
            SpinPolarization::NonCollinear => 4,
        }
    }

    /// Components of the supplied atomic reference magnetization.
    pub fn reference_components(self) -> usize {
        match self {
            SpinPolarization::Unpolarized => 0,
            SpinPolarization::Collinear => 1,
            SpinPolarization::NonCollinear => 3,
        }
    }

    pub fn spinor_count(self) -> usize {
        match self {
            SpinPolarization::NonCollinear => 2,
            _ => 1,
        }
    }
}

/// The outer loop the electronic solves are nested in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StructuralMode {
    /// One fixed geometry, no position history
    SinglePoint,
    MolecularDynamics { time_step: f64 },
    Relaxation,
}

impl StructuralMode {
    pub fn is_structural(self) -> bool {
        !matches!(self, StructuralMode::SinglePoint)
    }
}

/// How initial orbitals are randomized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrbitalSeeding {
    /// Each coefficient seeded by its global index; independent of partitioning
    #[default]
    Seeded,
    /// One stream per spin-group rank; faster, depends on the process layout
    ProcessLocal,
}

/// What to do when the position history gives a rank-deficient fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SingularHistoryPolicy {
    /// Use the minimum-norm coefficients from the truncated solve
    #[default]
    Accept,
    /// Drop the extrapolated deviation and restart from the atomic density
    FallbackToAtomic,
}

/// Electronic ground-state solve counters maintained by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepCounters {
    /// Completed electronic ground-state solves
    pub elecgs_count: usize,
    /// Solves spent on stress evaluation only
    pub stress_count: usize,
    /// Completed MD steps
    pub md_count: usize,
}

impl StepCounters {
    /// Solves that count towards the density history.
    pub fn net_solves(&self) -> usize {
        self.elecgs_count.saturating_sub(self.stress_count)
    }

    pub fn record_solve(&mut self, stress_only: bool) {
        self.elecgs_count += 1;
        if stress_only {
            self.stress_count += 1;
        }
    }
}

/// Ionic degrees of freedom supplied by the MD / relaxation driver.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicState {
    pub positions: Vec<Vector3<f64>>,
    /// Ionic velocities (MD)
    pub velocities: Vec<Vector3<f64>>,
    /// Current search direction (relaxation)
    pub search_direction: Vec<Vector3<f64>>,
    /// Step length along the search direction (relaxation)
    pub relax_factor: f64,
    /// 1.0 where a coordinate may move, 0.0 where it is held fixed
    pub movable: Vec<Vector3<f64>>,
}

impl AtomicState {
    /// Atoms at rest, every coordinate free to move.
    pub fn at_rest(positions: Vec<Vector3<f64>>) -> Self {
        let n = positions.len();
        AtomicState {
            positions,
            velocities: vec![Vector3::zeros(); n],
            search_direction: vec![Vector3::zeros(); n],
            relax_factor: 0.0,
            movable: vec![Vector3::repeat(1.0); n],
        }
    }

    pub fn num_atoms(&self) -> usize {
        self.positions.len()
    }

    fn validate(&self) -> Result<()> {
        let n = self.positions.len();
        ensure!(
            self.velocities.len() == n
                && self.search_direction.len() == n
                && self.movable.len() == n,
            "Atomic state arrays disagree: {} positions, {} velocities, {} directions, {} masks",
            n,
            self.velocities.len(),
            self.search_direction.len(),
            self.movable.len()
        );
        Ok(())
    }
}

/// Run-wide settings of the initial-guess machinery.
#[derive(Debug, Clone, PartialEq)]
pub struct GuessParams {
    pub spin: SpinPolarization,
    pub mode: StructuralMode,
    /// Total positive charge the density must integrate to
    pub target_charge: f64,
    /// Replacement value for negative extrapolated densities
    pub density_floor: f64,
    /// Relative singular-value cutoff of the history fit; negative = machine precision
    pub rcond: f64,
    pub singular_history: SingularHistoryPolicy,
    pub seeding: OrbitalSeeding,
}

impl GuessParams {
    pub fn new(spin: SpinPolarization, mode: StructuralMode, target_charge: f64) -> Self {
        GuessParams {
            spin,
            mode,
            target_charge,
            density_floor: DENSITY_FLOOR,
            rcond: -1.0,
            singular_history: SingularHistoryPolicy::default(),
            seeding: OrbitalSeeding::default(),
        }
    }
}

/// Everything the density and orbital initializers read and write.
///
/// `density_group` is `None` on processes outside the density domain group and
/// `orbital_group` is `None` outside the orbital domain group; the matching
/// operations are no-ops there.
pub struct SolverContext<G: ProcessGroup> {
    pub params: GuessParams,
    pub counters: StepCounters,
    pub grid: GridDescriptor,
    pub integration: Integration,
    pub atoms: AtomicState,
    pub reference: AtomicReference,
    pub density: DensityField,
    pub magnetization: Magnetization,
    pub extrapolation: ExtrapolationState,
    pub orbital_layout: Option<OrbitalLayout>,
    pub orbitals: Option<OrbitalSet>,
    pub density_group: Option<G>,
    pub orbital_group: Option<G>,
}

impl<G: ProcessGroup> SolverContext<G> {
    /// Set up the density side of the context. Orbitals are attached with
    /// [`SolverContext::with_orbitals`].
    pub fn new(
        params: GuessParams,
        grid: GridDescriptor,
        integration: Integration,
        atoms: AtomicState,
        reference: AtomicReference,
        density_group: Option<G>,
    ) -> Result<Self> {
        let nodes = grid.local_nodes();
        ensure!(
            params.target_charge > 0.0,
            "Target charge must be positive, got {}",
            params.target_charge
        );
        ensure!(
            params.density_floor > 0.0,
            "Density floor must be positive, got {}",
            params.density_floor
        );
        if let Integration::Weighted(w) = &integration {
            ensure!(
                w.len() == nodes,
                "Got {} integration weights for {} local nodes",
                w.len(),
                nodes
            );
        }
        reference.validate(nodes, params.spin)?;
        atoms.validate()?;

        let density = DensityField::zeros(nodes, params.spin);
        let magnetization = Magnetization::zeros(nodes, params.spin);
        let extrapolation = ExtrapolationState::new(nodes, atoms.num_atoms());

        Ok(SolverContext {
            params,
            counters: StepCounters::default(),
            grid,
            integration,
            atoms,
            reference,
            density,
            magnetization,
            extrapolation,
            orbital_layout: None,
            orbitals: None,
            density_group,
            orbital_group: None,
        })
    }

    pub fn with_orbitals(mut self, layout: OrbitalLayout, orbital_group: Option<G>) -> Result<Self> {
        layout.validate(self.params.spin)?;
        self.orbital_layout = Some(layout);
        self.orbital_group = orbital_group;
        Ok(self)
    }

    pub fn local_nodes(&self) -> usize {
        self.grid.local_nodes()
    }
}
