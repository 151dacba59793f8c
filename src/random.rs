//! Pseudo-random fills for initial orbitals
//!
//! The seeded generators derive every value from the global grid index alone,
//! so a field is bit-identical however the grid is split across processes.
//! The process-local generators draw one stream per rank and are only
//! reproducible for a fixed process layout.

use crate::grid::DomainVertices;
use num_complex::Complex64;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[inline]
fn node_rng(global_index: usize, offset: usize) -> StdRng {
    StdRng::seed_from_u64((global_index + 1 + offset) as u64)
}

/// Fill `buf` with values in `[low, high)` for the local `domain` of a grid of
/// `shape`. The value at global node `(i, j, k)` depends only on
/// `k*nx*ny + j*nx + i + offset`.
///
/// Panics if `low >= high` or if `buf` is shorter than the local domain.
pub fn seeded_rand_vec(
    buf: &mut [f64],
    domain: &DomainVertices,
    shape: [usize; 3],
    low: f64,
    high: f64,
    offset: usize,
) {
    let dist = Uniform::new(low, high);
    assert!(buf.len() >= domain.num_nodes());
    for (value, g) in buf.iter_mut().zip(domain.global_indices(shape)) {
        *value = dist.sample(&mut node_rng(g, offset));
    }
}

/// Complex counterpart of [`seeded_rand_vec`]: real then imaginary part are
/// the first two draws of the node's stream.
pub fn seeded_rand_vec_complex(
    buf: &mut [Complex64],
    domain: &DomainVertices,
    shape: [usize; 3],
    low: f64,
    high: f64,
    offset: usize,
) {
    let dist = Uniform::new(low, high);
    assert!(buf.len() >= domain.num_nodes());
    for (value, g) in buf.iter_mut().zip(domain.global_indices(shape)) {
        let mut rng = node_rng(g, offset);
        let re = dist.sample(&mut rng);
        let im = dist.sample(&mut rng);
        *value = Complex64::new(re, im);
    }
}

#[inline]
fn rank_rng(rank: usize) -> StdRng {
    StdRng::seed_from_u64((rank * 100 + 1) as u64)
}

/// Fill `buf` from a single stream seeded by the caller's rank.
pub fn set_rand_mat(buf: &mut [f64], low: f64, high: f64, rank: usize) {
    let dist = Uniform::new(low, high);
    let mut rng = rank_rng(rank);
    buf.iter_mut().for_each(|v| *v = dist.sample(&mut rng));
}

pub fn set_rand_mat_complex(buf: &mut [Complex64], low: f64, high: f64, rank: usize) {
    let dist = Uniform::new(low, high);
    let mut rng = rank_rng(rank);
    for v in buf.iter_mut() {
        let re = dist.sample(&mut rng);
        let im = dist.sample(&mut rng);
        *v = Complex64::new(re, im);
    }
}
