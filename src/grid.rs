//! Finite-difference grid and its domain decomposition

use color_eyre::eyre::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Inclusive index range `[start, end]` owned by one process along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainVertices {
    pub start: [usize; 3],
    pub end: [usize; 3],
}

impl DomainVertices {
    /// The whole grid as a single domain.
    pub fn whole(shape: [usize; 3]) -> Self {
        DomainVertices {
            start: [0, 0, 0],
            end: [shape[0] - 1, shape[1] - 1, shape[2] - 1],
        }
    }

    pub fn extent(&self, axis: usize) -> usize {
        self.end[axis] + 1 - self.start[axis]
    }

    /// Number of local grid nodes (`DMnd`).
    pub fn num_nodes(&self) -> usize {
        self.extent(0) * self.extent(1) * self.extent(2)
    }

    /// Global linear indices of the local nodes, x fastest then y then z.
    pub fn global_indices(&self, shape: [usize; 3]) -> impl Iterator<Item = usize> + '_ {
        let [nx, ny, _] = shape;
        (self.start[2]..=self.end[2]).flat_map(move |k| {
            (self.start[1]..=self.end[1]).flat_map(move |j| {
                (self.start[0]..=self.end[0]).map(move |i| k * nx * ny + j * nx + i)
            })
        })
    }
}

/// Global grid shape plus the calling process's share of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridDescriptor {
    pub shape: [usize; 3],
    pub domain: DomainVertices,
}

impl GridDescriptor {
    pub fn new(shape: [usize; 3], domain: DomainVertices) -> Result<Self> {
        ensure!(
            shape.iter().all(|&n| n > 0),
            "Grid shape must be positive along every axis, got {:?}",
            shape
        );
        for axis in 0..3 {
            ensure!(
                domain.start[axis] <= domain.end[axis] && domain.end[axis] < shape[axis],
                "Domain {:?} does not fit inside grid {:?} along axis {}",
                domain,
                shape,
                axis
            );
        }
        Ok(GridDescriptor { shape, domain })
    }

    /// A grid owned entirely by one process.
    pub fn serial(shape: [usize; 3]) -> Result<Self> {
        ensure!(
            shape.iter().all(|&n| n > 0),
            "Grid shape must be positive along every axis, got {:?}",
            shape
        );
        Ok(GridDescriptor {
            shape,
            domain: DomainVertices::whole(shape),
        })
    }

    /// Total number of global nodes (`Nd`).
    pub fn total_nodes(&self) -> usize {
        self.shape.iter().product()
    }

    /// Number of nodes owned locally (`DMnd`).
    pub fn local_nodes(&self) -> usize {
        self.domain.num_nodes()
    }
}

/// Split `n` points into `parts` contiguous blocks, the first `n % parts`
/// blocks one point longer. Returns the inclusive range of block `index`.
fn block_range(n: usize, parts: usize, index: usize) -> (usize, usize) {
    let base = n / parts;
    let rem = n % parts;
    let start = index * base + index.min(rem);
    let len = base + usize::from(index < rem);
    (start, start + len - 1)
}

/// Block decomposition of a grid over a `dims[0] x dims[1] x dims[2]` process
/// mesh. `coords` is the position of the calling process in that mesh.
pub fn block_domain(shape: [usize; 3], dims: [usize; 3], coords: [usize; 3]) -> Result<DomainVertices> {
    let mut start = [0; 3];
    let mut end = [0; 3];
    for axis in 0..3 {
        ensure!(
            dims[axis] > 0 && dims[axis] <= shape[axis],
            "Cannot split {} grid points over {} processes along axis {}",
            shape[axis],
            dims[axis],
            axis
        );
        ensure!(
            coords[axis] < dims[axis],
            "Process coordinate {} out of range for {} processes along axis {}",
            coords[axis],
            dims[axis],
            axis
        );
        let (s, e) = block_range(shape[axis], dims[axis], coords[axis]);
        start[axis] = s;
        end[axis] = e;
    }
    Ok(DomainVertices { start, end })
}

/// Rank-to-mesh mapping with x varying fastest.
pub fn mesh_coords(rank: usize, dims: [usize; 3]) -> [usize; 3] {
    [
        rank % dims[0],
        (rank / dims[0]) % dims[1],
        rank / (dims[0] * dims[1]),
    ]
}

/// Quadrature used to integrate a field over the local domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Integration {
    /// Uniform volume element `dV` per node (Cartesian grids)
    Uniform { dv: f64 },
    /// Per-node integration weights (curvilinear grids)
    Weighted(Vec<f64>),
}

impl Integration {
    /// Local integral of `values`; the caller reduces it across the group.
    pub fn integrate(&self, values: &[f64]) -> f64 {
        match self {
            Integration::Uniform { dv } => values.iter().sum::<f64>() * dv,
            Integration::Weighted(weights) => values
                .iter()
                .zip(weights)
                .map(|(rho, w)| rho * w)
                .sum(),
        }
    }
}
