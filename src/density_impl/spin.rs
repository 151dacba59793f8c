use super::{DensityField, Magnetization};

/// Split the total density into spin channels: `up = (ρ + m)/2`,
/// `down = (ρ - m)/2`. No-op for unpolarized densities.
pub fn resolve_spin_channels(density: &mut DensityField, magnetization: &[f64]) {
    let Some((total, up, down)) = density.channels_mut() else {
        return;
    };
    debug_assert_eq!(magnetization.len(), total.len());
    for (((rho, m), u), d) in total.iter().zip(magnetization).zip(up).zip(down) {
        *u = (rho + m) / 2.0;
        *d = (rho - m) / 2.0;
    }
}

/// Fill the norm channel `|m| = sqrt(mx² + my² + mz²)` of a non-collinear
/// magnetization from its vector components.
pub fn magnetization_norm(magnetization: &mut Magnetization) {
    let Some((norm, vector)) = magnetization.split_norm_mut() else {
        return;
    };
    let n = norm.len();
    let (mx, rest) = vector.split_at(n);
    let (my, mz) = rest.split_at(n);
    for (i, out) in norm.iter_mut().enumerate() {
        *out = (mx[i] * mx[i] + my[i] * my[i] + mz[i] * mz[i]).sqrt();
    }
}
