use crate::config::Config;
use crate::context::{AtomicState, SpinPolarization};
use crate::density_impl::AtomicReference;
use crate::grid::GridDescriptor;
use color_eyre::eyre::{eyre, Result};
use itertools::iproduct;
use nalgebra::Vector3;
use periodic_table_on_an_enum::Element;
use std::f64::consts::PI;
use tracing::info;

/// Exponent of the model atomic density `Z (a/π)^{3/2} exp(-a r²)`, in bohr⁻².
const GAUSSIAN_EXPONENT: f64 = 1.5;

/// Elements, ionic state and spin moments prepared from the configuration.
pub struct Geometry {
    pub elements: Vec<Element>,
    pub atoms: AtomicState,
    pub magmoms: Vec<f64>,
}

impl Geometry {
    /// Sum of atomic numbers.
    pub fn electron_count(&self) -> f64 {
        self.elements
            .iter()
            .map(|e| e.get_atomic_number() as f64)
            .sum()
    }
}

/// Build the atomic structure defined in the YAML configuration.
pub fn build_geometry(config: &Config) -> Result<Geometry> {
    info!("\nPreparing geometry...");

    let n = config.geometry.len();
    let mut elements = Vec::with_capacity(n);
    let mut positions = Vec::with_capacity(n);
    let mut velocities = Vec::with_capacity(n);
    let mut movable = Vec::with_capacity(n);
    let mut magmoms = Vec::with_capacity(n);

    for atom in &config.geometry {
        let element = Element::from_symbol(&atom.element)
            .ok_or_else(|| eyre!("Invalid element symbol: {}", atom.element))?;
        elements.push(element);
        positions.push(Vector3::from(atom.coords));
        velocities.push(Vector3::from(atom.velocity.unwrap_or([0.0; 3])));
        let mask = atom.movable.unwrap_or([true; 3]);
        movable.push(Vector3::from(mask.map(|free| if free { 1.0 } else { 0.0 })));
        magmoms.push(atom.magmom.unwrap_or(0.0));
    }

    let mut atoms = AtomicState::at_rest(positions);
    // Relaxation reuses the configured velocity as a fixed search direction
    atoms.search_direction = velocities.clone();
    atoms.velocities = velocities;
    atoms.movable = movable;

    Ok(Geometry {
        elements,
        atoms,
        magmoms,
    })
}

/// Superposition of Gaussian model densities over the local domain of `grid`,
/// with node `(i, j, k)` at `(i, j, k) · spacing`.
///
/// The magnetization of atom `a` is `magmom_a / Z_a` times its density: a
/// scalar for collinear spin, along z for non-collinear spin.
pub fn superposition(
    elements: &[Element],
    positions: &[Vector3<f64>],
    magmoms: &[f64],
    grid: &GridDescriptor,
    spacing: f64,
    spin: SpinPolarization,
) -> AtomicReference {
    let nodes = grid.local_nodes();
    let mut density = vec![0.0; nodes];
    let mut moment = vec![0.0; nodes];
    let norm = (GAUSSIAN_EXPONENT / PI).powf(1.5);
    let d = &grid.domain;

    let points = iproduct!(
        d.start[2]..=d.end[2],
        d.start[1]..=d.end[1],
        d.start[0]..=d.end[0]
    );
    for ((k, j, i), (rho, m)) in points.zip(density.iter_mut().zip(moment.iter_mut())) {
        let r = Vector3::new(i as f64, j as f64, k as f64) * spacing;
        for ((elem, pos), &magmom) in elements.iter().zip(positions).zip(magmoms) {
            let z = elem.get_atomic_number() as f64;
            let g = norm * (-GAUSSIAN_EXPONENT * (r - pos).norm_squared()).exp();
            *rho += z * g;
            *m += magmom * g;
        }
    }

    match spin {
        SpinPolarization::Unpolarized => AtomicReference::unpolarized(density),
        SpinPolarization::Collinear => AtomicReference::polarized(density, moment),
        SpinPolarization::NonCollinear => {
            // [mx | my | mz] with the moment along z
            let mut vector = vec![0.0; 2 * nodes];
            vector.extend_from_slice(&moment);
            AtomicReference::polarized(density, vector)
        }
    }
}
