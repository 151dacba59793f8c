//! Rank-truncating least-squares solve for the 2x2 history system

extern crate nalgebra as na;

use na::{Matrix2, Vector2};
use tracing::warn;

/// Result of a truncated-SVD least-squares solve.
#[derive(Debug, Clone, PartialEq)]
pub struct LsqSolution {
    /// Minimum-norm solution of `A x ≈ b`
    pub x: Vector2<f64>,
    /// Number of singular values kept
    pub rank: usize,
    pub singular_values: Vector2<f64>,
}

impl LsqSolution {
    pub fn is_full_rank(&self) -> bool {
        self.rank == 2
    }
}

/// Solve `A x ≈ b` in the least-squares sense.
///
/// Singular values `σ_i <= rcond * σ_max` are treated as zero, which yields the
/// minimum-norm solution for rank-deficient `A`. A negative `rcond` selects
/// machine precision. Singularity is never an error: an all-zero matrix
/// returns `x = 0` with rank 0.
pub fn solve_lsq(a: &Matrix2<f64>, b: &Vector2<f64>, rcond: f64) -> LsqSolution {
    let rcond = if rcond < 0.0 { f64::EPSILON } else { rcond };
    let svd = a.svd(true, true);
    let singular_values = svd.singular_values;
    let sigma_max = singular_values.max();
    let threshold = rcond * sigma_max;
    let rank = singular_values.iter().filter(|&&s| s > threshold).count();

    let x = match svd.solve(b, threshold) {
        Ok(x) => x,
        Err(msg) => {
            warn!("Least-squares history solve failed ({}), using zero coefficients", msg);
            Vector2::zeros()
        }
    };

    LsqSolution {
        x,
        rank,
        singular_values,
    }
}
