use super::runner::{RunPlan, StepReport};
use crate::density_impl::ExtrapolationOutcome;
use tracing::info;

pub fn report_plan(plan: &RunPlan) {
    info!("\nRun parameters:");
    info!("  Grid: {:?}, spacing {:.4} bohr", plan.shape, plan.spacing);
    info!("  Spin: {:?}", plan.params.spin);
    info!("  Mode: {:?}", plan.params.mode);
    info!("  Target charge: {:.6}", plan.params.target_charge);
    info!(
        "  Orbitals: {} bands, {} k-point(s), {}",
        plan.nstates,
        plan.nkpt,
        if plan.gamma_point { "real" } else { "complex" }
    );
    info!("  Seeding: {:?}", plan.params.seeding);
    info!("\nAtoms:");
    let geometry = &plan.geometry;
    for (i, (elem, pos)) in geometry
        .elements
        .iter()
        .zip(&geometry.atoms.positions)
        .enumerate()
    {
        info!(
            "  Atom {}: {} at [{:.6}, {:.6}, {:.6}]",
            i + 1,
            elem.get_symbol(),
            pos.x,
            pos.y,
            pos.z
        );
    }
}

pub fn report_step(report: &StepReport) {
    info!(
        "Step {:>3}: charge = {:.10}, orbital checksum = ({:+.8e}, {:+.8e})",
        report.step, report.charge, report.orbital_checksum.0, report.orbital_checksum.1
    );
    match report.extrapolation {
        ExtrapolationOutcome::Extrapolated { alpha, beta, rank } => {
            info!(
                "  Extrapolation: alpha = {:+.6}, beta = {:+.6} (rank {})",
                alpha, beta, rank
            );
        }
        ExtrapolationOutcome::FellBack { rank } => {
            info!("  Extrapolation: rank {} history, reset to atomic density", rank);
        }
        ExtrapolationOutcome::Accumulating { net_solves } => {
            info!("  Extrapolation: {} solve(s) of history", net_solves);
        }
        ExtrapolationOutcome::Skipped | ExtrapolationOutcome::Idle => {}
    }
}

pub fn report_summary(reports: &[StepReport]) {
    info!("\nInitial guess run finished.");
    if let Some(last) = reports.last() {
        info!("  Final integrated charge: {:.10}", last.charge);
    }
    let extrapolated = reports
        .iter()
        .filter(|r| matches!(r.extrapolation, ExtrapolationOutcome::Extrapolated { .. }))
        .count();
    info!("  Extrapolated guesses: {} of {}", extrapolated, reports.len());
}
