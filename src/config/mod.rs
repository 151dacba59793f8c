//! Configuration management for initial-guess runs
//!
//! This module handles the YAML run description, its defaults, and the
//! conversion into the library's parameter types.

mod args;

pub use args::Args;

use crate::context::{
    GuessParams, OrbitalSeeding, SingularHistoryPolicy, SpinPolarization, StructuralMode,
    DENSITY_FLOOR,
};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub geometry: Vec<Atom>,
    pub grid: GridParams,
    #[serde(default)]
    pub spin: SpinPolarization,
    /// Total electron count; defaults to the sum of atomic numbers
    pub charge: Option<f64>,
    #[serde(default)]
    pub structural: StructuralParams,
    #[serde(default)]
    pub orbitals: OrbitalParams,
    #[serde(default)]
    pub extrapolation: ExtrapolationParams,
    pub steps: Option<usize>,
}

/// Atomic position configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Atom {
    pub element: String,
    pub coords: [f64; 3],
    /// MD velocity, or relaxation search direction
    pub velocity: Option<[f64; 3]>,
    /// Per-coordinate freedom; all free when omitted
    pub movable: Option<[bool; 3]>,
    /// Spin moment carried by the atomic reference (z axis for non-collinear runs)
    pub magmom: Option<f64>,
}

/// Real-space grid parameters
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GridParams {
    pub shape: [usize; 3],
    pub spacing: Option<f64>,
    /// Process mesh the grid is split over
    pub decomposition: Option<[usize; 3]>,
}

impl GridParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        if self.spacing.is_none() {
            self.spacing = Some(0.5);
        }
        if self.decomposition.is_none() {
            self.decomposition = Some([1, 1, 1]);
        }
        self
    }
}

/// Outer loop around the electronic solves
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StructuralParams {
    #[default]
    SinglePoint,
    Md {
        time_step: f64,
    },
    Relax {
        step_factor: f64,
    },
}

impl StructuralParams {
    pub fn mode(self) -> StructuralMode {
        match self {
            StructuralParams::SinglePoint => StructuralMode::SinglePoint,
            StructuralParams::Md { time_step } => StructuralMode::MolecularDynamics { time_step },
            StructuralParams::Relax { .. } => StructuralMode::Relaxation,
        }
    }
}

/// Kohn-Sham orbital parameters
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OrbitalParams {
    pub bands: Option<usize>,
    pub kpoints: Option<usize>,
    pub gamma_point: Option<bool>,
    pub seeding: Option<OrbitalSeeding>,
}

impl Default for OrbitalParams {
    fn default() -> Self {
        OrbitalParams {
            bands: Some(8),
            kpoints: Some(1),
            gamma_point: Some(true),
            seeding: Some(OrbitalSeeding::Seeded),
        }
    }
}

impl OrbitalParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.bands.is_none() {
            self.bands = defaults.bands;
        }
        if self.kpoints.is_none() {
            self.kpoints = defaults.kpoints;
        }
        if self.gamma_point.is_none() {
            self.gamma_point = defaults.gamma_point;
        }
        if self.seeding.is_none() {
            self.seeding = defaults.seeding;
        }
        self
    }
}

/// Charge extrapolation parameters
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExtrapolationParams {
    pub density_floor: Option<f64>,
    pub rcond: Option<f64>,
    pub singular_history: Option<SingularHistoryPolicy>,
}

impl Default for ExtrapolationParams {
    fn default() -> Self {
        ExtrapolationParams {
            density_floor: Some(DENSITY_FLOOR),
            rcond: Some(-1.0),
            singular_history: Some(SingularHistoryPolicy::Accept),
        }
    }
}

impl ExtrapolationParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.density_floor.is_none() {
            self.density_floor = defaults.density_floor;
        }
        if self.rcond.is_none() {
            self.rcond = defaults.rcond;
        }
        if self.singular_history.is_none() {
            self.singular_history = defaults.singular_history;
        }
        self
    }
}

impl Config {
    /// Apply default values to all parameter sections
    pub fn with_defaults(mut self) -> Self {
        self.grid = self.grid.with_defaults();
        self.orbitals = self.orbitals.with_defaults();
        self.extrapolation = self.extrapolation.with_defaults();
        if self.steps.is_none() {
            self.steps = Some(match self.structural {
                StructuralParams::SinglePoint => 1,
                _ => 5,
            });
        }
        self
    }

    /// Library parameters for a run with the given total charge.
    /// Call after [`Config::with_defaults`].
    pub fn guess_params(&self, target_charge: f64) -> GuessParams {
        let mut params = GuessParams::new(self.spin, self.structural.mode(), target_charge);
        let defaults = ExtrapolationParams::default();
        let ext = &self.extrapolation;
        params.density_floor = ext.density_floor.or(defaults.density_floor).unwrap_or(DENSITY_FLOOR);
        params.rcond = ext.rcond.or(defaults.rcond).unwrap_or(-1.0);
        params.singular_history = ext.singular_history.unwrap_or_default();
        params.seeding = self.orbitals.seeding.unwrap_or_default();
        params
    }
}
