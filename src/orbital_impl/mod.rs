//! Kohn-Sham orbital storage and its random initial guess
//!
//! Each process stores its share of the orbitals as one matrix: rows run over
//! the local grid nodes of every local spinor component, columns over
//! `(k-point, band)` with the band index fastest. Column `k * nband_local + n`
//! therefore holds band `n` of local k-point `k`, and inside a column the
//! spinor components are stacked as blocks of `DMnd` rows.

mod init;


pub use init::{init_orbitals, OrbitalInit, RANDOM_RANGE};

use crate::context::SpinPolarization;
use crate::grid::GridDescriptor;
use color_eyre::eyre::{ensure, Result};
use nalgebra::DMatrix;
use num_complex::Complex64;

/// How the orbital arrays are split over the spin, k-point and band groups,
/// as seen from one process.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitalLayout {
    /// Orbital domain of this process (may differ from the density domain)
    pub grid: GridDescriptor,
    /// Spinor components in total (2 for non-collinear spin, else 1)
    pub nspinor: usize,
    pub nspinor_local: usize,
    pub spinor_start: usize,
    /// Bands in total (`Nstates`)
    pub nstates: usize,
    pub nband_local: usize,
    pub band_start: usize,
    pub nkpt_local: usize,
    pub kpt_start: usize,
    /// Only the zero k-point is sampled; orbitals are real
    pub gamma_point: bool,
    /// Rank inside the spin group; seeds the process-local fill
    pub spin_rank: usize,
}

impl OrbitalLayout {
    /// All bands, spinors and k-points owned by a single process.
    pub fn serial(grid: GridDescriptor, spin: SpinPolarization, nstates: usize, nkpt: usize, gamma_point: bool) -> Self {
        let nspinor = spin.spinor_count();
        OrbitalLayout {
            grid,
            nspinor,
            nspinor_local: nspinor,
            spinor_start: 0,
            nstates,
            nband_local: nstates,
            band_start: 0,
            nkpt_local: nkpt,
            kpt_start: 0,
            gamma_point,
            spin_rank: 0,
        }
    }

    /// Local rows: `DMnd · Nspinor_local`.
    pub fn local_rows(&self) -> usize {
        self.grid.local_nodes() * self.nspinor_local
    }

    /// Coefficients of one local k-point.
    pub fn kpoint_block_len(&self) -> usize {
        self.local_rows() * self.nband_local
    }

    pub fn local_columns(&self) -> usize {
        self.nband_local * self.nkpt_local
    }

    /// Global offset of the seeded stream for band `n` and spinor `s`
    /// (both local indices).
    pub fn seed_offset(&self, n: usize, s: usize) -> usize {
        let nd = self.grid.total_nodes();
        let band = self.band_start + n;
        let spinor = self.spinor_start + s;
        band * nd * self.nspinor + spinor * nd
    }

    pub(crate) fn validate(&self, spin: SpinPolarization) -> Result<()> {
        ensure!(
            self.nspinor == spin.spinor_count(),
            "{:?} needs {} spinor components, layout has {}",
            spin,
            spin.spinor_count(),
            self.nspinor
        );
        ensure!(
            self.spinor_start + self.nspinor_local <= self.nspinor,
            "Local spinors {}..{} exceed {} spinor components",
            self.spinor_start,
            self.spinor_start + self.nspinor_local,
            self.nspinor
        );
        ensure!(
            self.band_start + self.nband_local <= self.nstates,
            "Local bands {}..{} exceed {} states",
            self.band_start,
            self.band_start + self.nband_local,
            self.nstates
        );
        ensure!(self.nkpt_local > 0, "Orbital layout holds no k-points");
        ensure!(
            !self.gamma_point || self.kpt_start + self.nkpt_local <= 1,
            "A gamma-point calculation has a single k-point, layout holds {}",
            self.kpt_start + self.nkpt_local
        );
        Ok(())
    }
}

/// Orbital coefficients plus a one-k-point work block of the same type.
#[derive(Debug, Clone, PartialEq)]
pub enum OrbitalSet {
    Real {
        coeffs: DMatrix<f64>,
        work: DMatrix<f64>,
    },
    Complex {
        coeffs: DMatrix<Complex64>,
        work: DMatrix<Complex64>,
    },
}

impl OrbitalSet {
    pub fn is_real(&self) -> bool {
        matches!(self, OrbitalSet::Real { .. })
    }

    pub fn shape(&self) -> (usize, usize) {
        match self {
            OrbitalSet::Real { coeffs, .. } => coeffs.shape(),
            OrbitalSet::Complex { coeffs, .. } => coeffs.shape(),
        }
    }

    pub fn real(&self) -> Option<&DMatrix<f64>> {
        match self {
            OrbitalSet::Real { coeffs, .. } => Some(coeffs),
            OrbitalSet::Complex { .. } => None,
        }
    }

    pub fn complex(&self) -> Option<&DMatrix<Complex64>> {
        match self {
            OrbitalSet::Complex { coeffs, .. } => Some(coeffs),
            OrbitalSet::Real { .. } => None,
        }
    }

    /// Sum of all coefficients (real part, then imaginary part).
    pub fn checksum(&self) -> (f64, f64) {
        match self {
            OrbitalSet::Real { coeffs, .. } => (coeffs.sum(), 0.0),
            OrbitalSet::Complex { coeffs, .. } => {
                let s = coeffs.iter().fold(Complex64::new(0.0, 0.0), |acc, z| acc + z);
                (s.re, s.im)
            }
        }
    }
}
