//! Electron density initial guess
//!
//! The density on each process is a contiguous block of `DMnd` nodes per
//! channel. Unpolarized runs store only the total density; spin-polarized runs
//! store `[total | up | down]`. Magnetization lives in its own array:
//! `[m]` for collinear spin and `[|m| | mx | my | mz]` for non-collinear spin.
//!
//! # Flow per structural step
//!
//! ```ignore
//! init_electron_density(&mut ctx);   // first guess, or normalized carry-over / extrapolation
//! // ... SCF runs, driver records the solve ...
//! extrapolate_density(&mut ctx);     // builds the guess for the next step
//! ```

mod extrapolation;
mod guess;
mod spin;

#[cfg(test)]
mod tests;

pub use extrapolation::{
    combine_deviations, extrapolate_density, history_normal_equations, ExtrapolationOutcome,
    ExtrapolationState,
};
pub use guess::{init_electron_density, normalize_charge, stage_extrapolated_density};
pub use spin::{magnetization_norm, resolve_spin_channels};

use crate::context::SpinPolarization;
use color_eyre::eyre::{ensure, Result};

/// Local electron density, one block of `nodes` values per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityField {
    nodes: usize,
    spin: SpinPolarization,
    data: Vec<f64>,
}

impl DensityField {
    pub fn zeros(nodes: usize, spin: SpinPolarization) -> Self {
        DensityField {
            nodes,
            spin,
            data: vec![0.0; nodes * spin.density_channels()],
        }
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn spin(&self) -> SpinPolarization {
        self.spin
    }

    pub fn total(&self) -> &[f64] {
        &self.data[..self.nodes]
    }

    pub fn total_mut(&mut self) -> &mut [f64] {
        &mut self.data[..self.nodes]
    }

    /// Spin-up channel; `None` for unpolarized densities.
    pub fn up(&self) -> Option<&[f64]> {
        self.spin
            .is_polarized()
            .then(|| &self.data[self.nodes..2 * self.nodes])
    }

    pub fn down(&self) -> Option<&[f64]> {
        self.spin
            .is_polarized()
            .then(|| &self.data[2 * self.nodes..3 * self.nodes])
    }

    /// Total, up and down channels borrowed together.
    pub fn channels_mut(&mut self) -> Option<(&mut [f64], &mut [f64], &mut [f64])> {
        if !self.spin.is_polarized() {
            return None;
        }
        let (total, rest) = self.data.split_at_mut(self.nodes);
        let (up, down) = rest.split_at_mut(self.nodes);
        Some((total, up, down))
    }
}

/// Local magnetization, laid out per [`SpinPolarization::magnetization_channels`].
#[derive(Debug, Clone, PartialEq)]
pub struct Magnetization {
    nodes: usize,
    spin: SpinPolarization,
    data: Vec<f64>,
}

impl Magnetization {
    pub fn zeros(nodes: usize, spin: SpinPolarization) -> Self {
        Magnetization {
            nodes,
            spin,
            data: vec![0.0; nodes * spin.magnetization_channels()],
        }
    }

    /// The value the up/down split uses: `m` (collinear) or `|m|` (non-collinear).
    pub fn scalar(&self) -> &[f64] {
        &self.data[..self.nodes.min(self.data.len())]
    }

    pub fn scalar_mut(&mut self) -> &mut [f64] {
        let end = self.nodes.min(self.data.len());
        &mut self.data[..end]
    }

    /// `(mx, my, mz)` concatenated, non-collinear only.
    pub fn vector(&self) -> Option<&[f64]> {
        (self.spin == SpinPolarization::NonCollinear).then(|| &self.data[self.nodes..])
    }

    /// Norm channel and vector components borrowed together, non-collinear only.
    pub fn split_norm_mut(&mut self) -> Option<(&mut [f64], &mut [f64])> {
        if self.spin != SpinPolarization::NonCollinear {
            return None;
        }
        Some(self.data.split_at_mut(self.nodes))
    }
}

/// Superposition-of-atoms reference density and magnetization, read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicReference {
    pub density: Vec<f64>,
    /// `DMnd` values (collinear), `3·DMnd` as `[mx | my | mz]` (non-collinear), empty otherwise
    pub magnetization: Vec<f64>,
}

impl AtomicReference {
    pub fn unpolarized(density: Vec<f64>) -> Self {
        AtomicReference {
            density,
            magnetization: Vec::new(),
        }
    }

    pub fn polarized(density: Vec<f64>, magnetization: Vec<f64>) -> Self {
        AtomicReference {
            density,
            magnetization,
        }
    }

    pub(crate) fn validate(&self, nodes: usize, spin: SpinPolarization) -> Result<()> {
        ensure!(
            self.density.len() == nodes,
            "Atomic reference density has {} values for {} local nodes",
            self.density.len(),
            nodes
        );
        let expected = nodes * spin.reference_components();
        ensure!(
            self.magnetization.len() == expected,
            "Atomic reference magnetization has {} values, expected {} for {:?}",
            self.magnetization.len(),
            expected,
            spin
        );
        Ok(())
    }
}
