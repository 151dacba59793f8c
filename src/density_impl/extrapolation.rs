//! Charge extrapolation across structural steps
//!
//! The density deviation from the atomic superposition is assumed to follow
//! the ionic trajectory. With `Δ_k` the deviation `k` steps back and `p_k`
//! the matching positions, fit `α, β` so that
//!
//!   p_next - p_0 ≈ α (p_0 - p_1) + β (p_1 - p_2)
//!
//! and predict
//!
//!   Δ_next = (1 + α) Δ_0 + (β - α) Δ_1 - β Δ_2
//!
//! Ref: Alfè, "Ab initio molecular dynamics, a simple algorithm for charge
//! extrapolation", Comput. Phys. Commun. 118 (1999) 31.

extern crate nalgebra as na;

use super::guess::MIN_HISTORY_SOLVES;
use crate::comm::ProcessGroup;
use crate::context::{SingularHistoryPolicy, SolverContext, StructuralMode};
use crate::history::History;
use crate::lsq::solve_lsq;
use na::{Matrix2, Vector2, Vector3};
use tracing::{debug, warn};

/// Depth of the density and position histories.
const HISTORY_DEPTH: usize = 3;

/// Rolling histories and the predicted deviation handed to the next guess.
#[derive(Debug, Clone)]
pub struct ExtrapolationState {
    deviations: History<Vec<f64>, HISTORY_DEPTH>,
    positions: History<Vec<Vector3<f64>>, HISTORY_DEPTH>,
    predicted: Vec<Vector3<f64>>,
    pending: Option<Vec<f64>>,
}

impl ExtrapolationState {
    pub fn new(nodes: usize, num_atoms: usize) -> Self {
        ExtrapolationState {
            deviations: History::filled(vec![0.0; nodes]),
            positions: History::filled(vec![Vector3::zeros(); num_atoms]),
            predicted: vec![Vector3::zeros(); num_atoms],
            pending: None,
        }
    }

    /// Deviation `ρ - ρ_at` recorded `age` solves ago.
    pub fn deviation(&self, age: usize) -> &[f64] {
        self.deviations.get(age)
    }

    pub fn positions(&self, age: usize) -> &[Vector3<f64>] {
        self.positions.get(age)
    }

    /// Positions expected at the next structural step.
    pub fn predicted(&self) -> &[Vector3<f64>] {
        &self.predicted
    }

    /// Extrapolated deviation waiting to be added to the atomic density;
    /// `None` until enough history has accumulated.
    pub fn pending(&self) -> Option<&[f64]> {
        self.pending.as_deref()
    }

    /// Overwrite the age-0 position snapshot without shifting the history.
    pub fn snapshot_positions(&mut self, positions: &[Vector3<f64>]) {
        self.positions.get_mut(0).copy_from_slice(positions);
    }

    pub(crate) fn deviations_mut(&mut self) -> &mut History<Vec<f64>, HISTORY_DEPTH> {
        &mut self.deviations
    }

    pub(crate) fn positions_mut(&mut self) -> &mut History<Vec<Vector3<f64>>, HISTORY_DEPTH> {
        &mut self.positions
    }

    pub(crate) fn predicted_mut(&mut self) -> &mut [Vector3<f64>] {
        &mut self.predicted
    }

    fn pending_mut(&mut self, nodes: usize) -> &mut Vec<f64> {
        self.pending.get_or_insert_with(|| vec![0.0; nodes])
    }
}

/// What one call to [`extrapolate_density`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtrapolationOutcome {
    /// Caller is outside the density group
    Idle,
    /// Not a structural run; there is no trajectory to extrapolate along
    Skipped,
    /// Histories shifted, not enough solves yet to fit
    Accumulating { net_solves: usize },
    /// A new deviation was predicted from the fitted coefficients
    Extrapolated { alpha: f64, beta: f64, rank: usize },
    /// The fit was rank deficient and the deviation was reset to zero
    FellBack { rank: usize },
}

/// Normal equations `FᵀF s = Fᵀf` of the position fit. Columns of `F` are
/// `p0 - p1` and `p1 - p2`; the target `f` is `p_next - p0`.
pub fn history_normal_equations(
    p0: &[Vector3<f64>],
    p1: &[Vector3<f64>],
    p2: &[Vector3<f64>],
    next: &[Vector3<f64>],
) -> (Matrix2<f64>, Vector2<f64>) {
    let mut ftf = Matrix2::zeros();
    let mut rhs = Vector2::zeros();
    for (((r0, r1), r2), rn) in p0.iter().zip(p1).zip(p2).zip(next) {
        let a = r0 - r1;
        let b = r1 - r2;
        let t = rn - r0;
        ftf[(0, 0)] += a.dot(&a);
        ftf[(0, 1)] += a.dot(&b);
        ftf[(1, 1)] += b.dot(&b);
        rhs[0] += a.dot(&t);
        rhs[1] += b.dot(&t);
    }
    ftf[(1, 0)] = ftf[(0, 1)];
    (ftf, rhs)
}

/// `out = (1 + α) Δ0 + (β - α) Δ1 - β Δ2`
pub fn combine_deviations(
    dev0: &[f64],
    dev1: &[f64],
    dev2: &[f64],
    alpha: f64,
    beta: f64,
    out: &mut [f64],
) {
    for (((o, d0), d1), d2) in out.iter_mut().zip(dev0).zip(dev1).zip(dev2) {
        *o = (1.0 + alpha) * d0 + (beta - alpha) * d1 - beta * d2;
    }
}

/// Record the density of the solve that just finished and predict the
/// deviation for the next structural step.
///
/// Call once after every electronic solve of a structural run, after the
/// driver has updated the step counters and the ionic velocities or search
/// direction.
pub fn extrapolate_density<G: ProcessGroup>(ctx: &mut SolverContext<G>) -> ExtrapolationOutcome {
    if ctx.density_group.is_none() {
        return ExtrapolationOutcome::Idle;
    }
    let mode = ctx.params.mode;
    if !mode.is_structural() {
        debug!("Single-point run, skipping charge extrapolation");
        return ExtrapolationOutcome::Skipped;
    }

    let net_solves = ctx.counters.net_solves();
    let state = &mut ctx.extrapolation;

    let dev0 = state.deviations.advance();
    for ((d, rho), rho_at) in dev0
        .iter_mut()
        .zip(ctx.density.total())
        .zip(&ctx.reference.density)
    {
        *d = rho - rho_at;
    }

    let atoms = &ctx.atoms;
    match mode {
        StructuralMode::MolecularDynamics { time_step } => {
            if ctx.counters.md_count <= 1 {
                state.predicted.copy_from_slice(&atoms.positions);
            } else {
                for (p, v) in state.predicted.iter_mut().zip(&atoms.velocities) {
                    *p += v * time_step;
                }
            }
        }
        StructuralMode::Relaxation => {
            if net_solves <= 1 {
                state.predicted.copy_from_slice(&atoms.positions);
            } else {
                for ((p, d), mask) in state
                    .predicted
                    .iter_mut()
                    .zip(&atoms.search_direction)
                    .zip(&atoms.movable)
                {
                    *p += d.component_mul(mask) * atoms.relax_factor;
                }
            }
        }
        StructuralMode::SinglePoint => unreachable!("single-point runs return early"),
    }

    let outcome = if net_solves >= MIN_HISTORY_SOLVES {
        let (ftf, rhs) = history_normal_equations(
            state.positions.get(0),
            state.positions.get(1),
            state.positions.get(2),
            &state.predicted,
        );
        let solution = solve_lsq(&ftf, &rhs, ctx.params.rcond);
        let nodes = state.deviations.get(0).len();

        if !solution.is_full_rank() {
            warn!(
                "Charge extrapolation history is rank deficient (rank {}, singular values {:.3e}, {:.3e})",
                solution.rank, solution.singular_values[0], solution.singular_values[1]
            );
        }

        match ctx.params.singular_history {
            SingularHistoryPolicy::FallbackToAtomic if !solution.is_full_rank() => {
                state.pending_mut(nodes).fill(0.0);
                ExtrapolationOutcome::FellBack {
                    rank: solution.rank,
                }
            }
            _ => {
                let (alpha, beta) = (solution.x[0], solution.x[1]);
                debug!("Charge extrapolation coefficients alpha = {:.6}, beta = {:.6}", alpha, beta);
                // Take the pending buffer out so the history can be borrowed alongside it
                let mut pending = state.pending.take().unwrap_or_else(|| vec![0.0; nodes]);
                combine_deviations(
                    state.deviations.get(0),
                    state.deviations.get(1),
                    state.deviations.get(2),
                    alpha,
                    beta,
                    &mut pending,
                );
                state.pending = Some(pending);
                ExtrapolationOutcome::Extrapolated {
                    alpha,
                    beta,
                    rank: solution.rank,
                }
            }
        }
    } else {
        ExtrapolationOutcome::Accumulating { net_solves }
    };

    state.positions.advance().copy_from_slice(&state.predicted);
    outcome
}
