use super::spin::{magnetization_norm, resolve_spin_channels};
use crate::comm::{Participation, ProcessGroup};
use crate::context::{SolverContext, SpinPolarization};
use crate::grid::Integration;
use tracing::{debug, warn};

/// Extrapolation needs this many net electronic solves of history.
pub(crate) const MIN_HISTORY_SOLVES: usize = 3;

/// Stage the density guess for the upcoming electronic solve.
///
/// On the first solve the density is the superposition of atomic densities
/// (and, for spin-polarized runs, the atomic magnetization). On later solves
/// the density carried over from the previous step, or the extrapolated one
/// once enough history exists, is rescaled to the target charge and split
/// into spin channels.
pub fn init_electron_density<G: ProcessGroup>(ctx: &mut SolverContext<G>) -> Participation {
    let Some(group) = ctx.density_group.as_ref() else {
        return Participation::Idle;
    };
    debug!("Initializing electron density ...");

    let net_solves = ctx.counters.net_solves();
    if net_solves == 0 {
        ctx.density
            .total_mut()
            .copy_from_slice(&ctx.reference.density);

        match ctx.params.spin {
            SpinPolarization::Unpolarized => {}
            SpinPolarization::Collinear => {
                ctx.magnetization
                    .scalar_mut()
                    .copy_from_slice(&ctx.reference.magnetization);
                resolve_spin_channels(&mut ctx.density, ctx.magnetization.scalar());
            }
            SpinPolarization::NonCollinear => {
                if let Some((_, vector)) = ctx.magnetization.split_norm_mut() {
                    vector.copy_from_slice(&ctx.reference.magnetization);
                }
                magnetization_norm(&mut ctx.magnetization);
                resolve_spin_channels(&mut ctx.density, ctx.magnetization.scalar());
            }
        }

        if ctx.params.mode.is_structural() {
            ctx.extrapolation.snapshot_positions(&ctx.atoms.positions);
        }
        return Participation::Active;
    }

    if net_solves >= MIN_HISTORY_SOLVES && ctx.params.mode.is_structural() {
        if let Some(pending) = ctx.extrapolation.pending() {
            debug!("Using charge extrapolation for density guess");
            let clamped = stage_extrapolated_density(
                ctx.density.total_mut(),
                &ctx.reference.density,
                pending,
                ctx.params.density_floor,
            );
            if clamped > 0 {
                debug!("Clamped {} negative extrapolated density values", clamped);
            }
        }
    }

    let scale = normalize_charge(
        ctx.density.total_mut(),
        &ctx.integration,
        group,
        ctx.params.target_charge,
    );
    debug!("Density rescaled by {:.12} to charge {}", scale, ctx.params.target_charge);

    if ctx.params.spin.is_polarized() {
        resolve_spin_channels(&mut ctx.density, ctx.magnetization.scalar());
    }
    Participation::Active
}

/// `ρ = ρ_at + δρ`, with negative results replaced by `floor`. Returns the
/// number of clamped nodes.
pub fn stage_extrapolated_density(
    total: &mut [f64],
    reference: &[f64],
    deviation: &[f64],
    floor: f64,
) -> usize {
    let mut clamped = 0;
    for ((rho, rho_at), drho) in total.iter_mut().zip(reference).zip(deviation) {
        *rho = rho_at + drho;
        if *rho < 0.0 {
            *rho = floor;
            clamped += 1;
        }
    }
    clamped
}

/// Rescale `total` so that its integral over all members of `group` equals
/// `target`. Collective: every member must call it. Returns the scale factor.
pub fn normalize_charge(
    total: &mut [f64],
    integration: &Integration,
    group: &impl ProcessGroup,
    target: f64,
) -> f64 {
    let integral = group.all_reduce_sum(integration.integrate(total));
    if !(integral > 0.0) {
        warn!(
            "Integrated density is {}; leaving density unscaled",
            integral
        );
        return 1.0;
    }
    let scale = target / integral;
    total.iter_mut().for_each(|rho| *rho *= scale);
    scale
}
