use super::{OrbitalLayout, OrbitalSet};
use crate::comm::ProcessGroup;
use crate::context::{OrbitalSeeding, SolverContext};
use crate::grid::DomainVertices;
use crate::memory::{alloc_or_exit, checked_len};
use crate::random::{seeded_rand_vec, seeded_rand_vec_complex, set_rand_mat, set_rand_mat_complex};
use nalgebra::{DMatrix, Scalar};
use num_complex::Complex64;
use rayon::prelude::*;
use std::time::Instant;
use tracing::debug;

/// Half-open range of the random initial coefficients.
pub const RANDOM_RANGE: (f64, f64) = (-0.5, 0.5);

type SeededFill<T> = fn(&mut [T], &DomainVertices, [usize; 3], f64, f64, usize);
type LocalFill<T> = fn(&mut [T], f64, f64, usize);

/// What one call to [`init_orbitals`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrbitalInit {
    /// Caller is outside the orbital domain group
    Idle,
    /// Orbitals were allocated and randomized
    Initialized,
    /// Not the first electronic solve; the existing orbitals were left alone
    Unchanged,
}

/// Allocate and randomize the orbitals before the very first electronic
/// solve of the run. Later calls leave the orbitals untouched.
///
/// Every local k-point receives the same pattern. With
/// [`OrbitalSeeding::Seeded`] the values depend only on global band, spinor
/// and grid indices, so they do not change with the process layout.
pub fn init_orbitals<G: ProcessGroup>(ctx: &mut SolverContext<G>) -> OrbitalInit {
    let (Some(_), Some(layout)) = (&ctx.orbital_group, &ctx.orbital_layout) else {
        return OrbitalInit::Idle;
    };
    if ctx.counters.elecgs_count != 0 || ctx.orbitals.is_some() {
        return OrbitalInit::Unchanged;
    }
    debug!("Initializing Kohn-Sham orbitals ...");

    let seeding = ctx.params.seeding;
    let start = Instant::now();
    let set = if layout.gamma_point {
        let mut coeffs = alloc_matrix(layout, layout.local_columns(), 0.0, "orbital coefficients");
        let work = alloc_matrix(layout, layout.nband_local, 0.0, "orbital work block");
        fill_kpoint_blocks::<f64>(
            coeffs.as_mut_slice(),
            layout,
            seeding,
            seeded_rand_vec,
            set_rand_mat,
        );
        OrbitalSet::Real { coeffs, work }
    } else {
        let zero = Complex64::new(0.0, 0.0);
        let mut coeffs = alloc_matrix(layout, layout.local_columns(), zero, "orbital coefficients");
        let work = alloc_matrix(layout, layout.nband_local, zero, "orbital work block");
        fill_kpoint_blocks::<Complex64>(
            coeffs.as_mut_slice(),
            layout,
            seeding,
            seeded_rand_vec_complex,
            set_rand_mat_complex,
        );
        OrbitalSet::Complex { coeffs, work }
    };
    debug!(
        "Finished setting random orbitals. Time taken: {:.3} ms",
        start.elapsed().as_secs_f64() * 1e3
    );

    ctx.orbitals = Some(set);
    OrbitalInit::Initialized
}

fn alloc_matrix<T: Scalar>(layout: &OrbitalLayout, cols: usize, zero: T, what: &str) -> DMatrix<T> {
    let rows = layout.local_rows();
    let data = alloc_or_exit(checked_len(rows, cols, what), zero, what);
    DMatrix::from_vec(rows, cols, data)
}

/// Randomize the first k-point block, then copy it to the other local
/// k-points.
fn fill_kpoint_blocks<T: Copy + Send>(
    buf: &mut [T],
    layout: &OrbitalLayout,
    seeding: OrbitalSeeding,
    seeded: SeededFill<T>,
    local: LocalFill<T>,
) {
    let block = layout.kpoint_block_len();
    if block == 0 || buf.len() < block {
        return;
    }
    let (low, high) = RANDOM_RANGE;
    let (first, rest) = buf.split_at_mut(block);

    match seeding {
        OrbitalSeeding::Seeded => {
            let dmnd = layout.grid.local_nodes();
            let nspinor_local = layout.nspinor_local;
            // One chunk per (band, spinor), band outermost
            first
                .par_chunks_mut(dmnd)
                .enumerate()
                .for_each(|(c, chunk)| {
                    let offset = layout.seed_offset(c / nspinor_local, c % nspinor_local);
                    seeded(chunk, &layout.grid.domain, layout.grid.shape, low, high, offset);
                });
        }
        OrbitalSeeding::ProcessLocal => local(first, low, high, layout.spin_rank),
    }

    for other in rest.chunks_mut(block) {
        other.copy_from_slice(first);
    }
}
