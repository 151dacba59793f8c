//! Tests for the density initial guess and charge extrapolation

use super::*;
use crate::comm::{Participation, SerialGroup};
use crate::context::{
    AtomicState, GuessParams, SingularHistoryPolicy, SolverContext, SpinPolarization,
    StructuralMode, DENSITY_FLOOR,
};
use crate::grid::{GridDescriptor, Integration};
use crate::lsq::solve_lsq;
use nalgebra::Vector3;

fn context(
    spin: SpinPolarization,
    mode: StructuralMode,
    reference: AtomicReference,
    target_charge: f64,
    atoms: AtomicState,
) -> SolverContext<SerialGroup> {
    let nodes = reference.density.len();
    let grid = GridDescriptor::serial([nodes, 1, 1]).unwrap();
    let params = GuessParams::new(spin, mode, target_charge);
    SolverContext::new(
        params,
        grid,
        Integration::Uniform { dv: 1.0 },
        atoms,
        reference,
        Some(SerialGroup),
    )
    .unwrap()
}

fn integrated_charge(ctx: &SolverContext<SerialGroup>) -> f64 {
    ctx.integration.integrate(ctx.density.total())
}

#[test]
fn test_first_step_copies_reference_then_normalizes() {
    let reference = AtomicReference::unpolarized(vec![0.1, 0.2, 0.3, 0.4]);
    let mut ctx = context(
        SpinPolarization::Unpolarized,
        StructuralMode::SinglePoint,
        reference,
        2.0,
        AtomicState::at_rest(vec![]),
    );

    assert_eq!(init_electron_density(&mut ctx), Participation::Active);
    assert_eq!(ctx.density.total(), &[0.1, 0.2, 0.3, 0.4]);

    ctx.counters.record_solve(false);
    init_electron_density(&mut ctx);
    let expected = [0.2, 0.4, 0.6, 0.8];
    for (rho, e) in ctx.density.total().iter().zip(expected) {
        assert!((rho - e).abs() < 1e-14, "{} != {}", rho, e);
    }
    assert!((integrated_charge(&ctx) - 2.0).abs() < 1e-12);
}

#[test]
fn test_normalize_with_integration_weights() {
    let mut rho = vec![1.0, 2.0, 3.0, 4.0];
    let weights = Integration::Weighted(vec![0.5, 0.25, 0.0, 1.0]);
    // 0.5 + 0.5 + 0 + 4 = 5
    let scale = normalize_charge(&mut rho, &weights, &SerialGroup, 10.0);
    assert!((scale - 2.0).abs() < 1e-14);
    assert_eq!(rho, vec![2.0, 4.0, 6.0, 8.0]);
    assert!((weights.integrate(&rho) - 10.0).abs() < 1e-12);
}

#[test]
fn test_normalize_leaves_empty_density_alone() {
    let mut rho = vec![0.0; 3];
    let scale = normalize_charge(&mut rho, &Integration::Uniform { dv: 1.0 }, &SerialGroup, 1.0);
    assert_eq!(scale, 1.0);
    assert_eq!(rho, vec![0.0; 3]);
}

#[test]
fn test_collinear_channels_are_exact() {
    let reference = AtomicReference::polarized(
        vec![1.0, 0.5, 0.25, 2.0],
        vec![0.5, -0.25, 0.0, 1.0],
    );
    let mut ctx = context(
        SpinPolarization::Collinear,
        StructuralMode::SinglePoint,
        reference,
        7.5,
        AtomicState::at_rest(vec![]),
    );
    init_electron_density(&mut ctx);
    assert_eq!(ctx.magnetization.scalar(), &[0.5, -0.25, 0.0, 1.0]);

    let check = |ctx: &SolverContext<SerialGroup>| {
        let total = ctx.density.total();
        let up = ctx.density.up().unwrap();
        let down = ctx.density.down().unwrap();
        let m = ctx.magnetization.scalar();
        for i in 0..total.len() {
            assert_eq!(up[i] + down[i], total[i]);
            assert_eq!(up[i] - down[i], m[i]);
        }
    };
    check(&ctx);
    assert_eq!(ctx.density.up().unwrap(), &[0.75, 0.125, 0.125, 1.5]);

    // Sum is 3.75, so the rescale is an exact doubling
    ctx.counters.record_solve(false);
    init_electron_density(&mut ctx);
    assert_eq!(ctx.density.total(), &[2.0, 1.0, 0.5, 4.0]);
    check(&ctx);
}

#[test]
fn test_noncollinear_uses_magnetization_norm() {
    let reference = AtomicReference::polarized(
        vec![10.0, 4.0],
        // [mx | my | mz]
        vec![3.0, 0.0, 4.0, 0.0, 0.0, 2.0],
    );
    let mut ctx = context(
        SpinPolarization::NonCollinear,
        StructuralMode::SinglePoint,
        reference,
        14.0,
        AtomicState::at_rest(vec![]),
    );
    init_electron_density(&mut ctx);

    assert_eq!(ctx.magnetization.scalar(), &[5.0, 2.0]);
    assert_eq!(
        ctx.magnetization.vector().unwrap(),
        &[3.0, 0.0, 4.0, 0.0, 0.0, 2.0]
    );
    assert_eq!(ctx.density.up().unwrap(), &[7.5, 3.0]);
    assert_eq!(ctx.density.down().unwrap(), &[2.5, 1.0]);
}

#[test]
fn test_first_step_snapshots_positions_for_structural_runs() {
    let positions = vec![Vector3::new(1.0, 2.0, 3.0), Vector3::new(-1.0, 0.0, 0.5)];
    let mut ctx = context(
        SpinPolarization::Unpolarized,
        StructuralMode::MolecularDynamics { time_step: 1.0 },
        AtomicReference::unpolarized(vec![0.5; 4]),
        2.0,
        AtomicState::at_rest(positions.clone()),
    );
    init_electron_density(&mut ctx);
    assert_eq!(ctx.extrapolation.positions(0), positions.as_slice());
    assert_eq!(ctx.extrapolation.positions(1), &[Vector3::<f64>::zeros(); 2]);

    let mut single = context(
        SpinPolarization::Unpolarized,
        StructuralMode::SinglePoint,
        AtomicReference::unpolarized(vec![0.5; 4]),
        2.0,
        AtomicState::at_rest(positions),
    );
    init_electron_density(&mut single);
    assert_eq!(single.extrapolation.positions(0), &[Vector3::<f64>::zeros(); 2]);
}

#[test]
fn test_non_member_is_idle() {
    let reference = AtomicReference::unpolarized(vec![0.1, 0.2, 0.3, 0.4]);
    let nodes = reference.density.len();
    let mut ctx = SolverContext::<SerialGroup>::new(
        GuessParams::new(
            SpinPolarization::Unpolarized,
            StructuralMode::Relaxation,
            1.0,
        ),
        GridDescriptor::serial([nodes, 1, 1]).unwrap(),
        Integration::Uniform { dv: 1.0 },
        AtomicState::at_rest(vec![Vector3::new(1.0, 1.0, 1.0)]),
        reference,
        None,
    )
    .unwrap();
    ctx.counters.elecgs_count = 5;

    assert!(init_electron_density(&mut ctx).is_idle());
    assert_eq!(extrapolate_density(&mut ctx), ExtrapolationOutcome::Idle);
    assert_eq!(ctx.density.total(), &[0.0; 4]);
    assert_eq!(ctx.extrapolation.deviation(0), &[0.0; 4]);
    assert_eq!(ctx.extrapolation.positions(0), &[Vector3::<f64>::zeros()]);
    assert!(ctx.extrapolation.pending().is_none());
}

#[test]
fn test_single_point_skips_extrapolation() {
    let mut ctx = context(
        SpinPolarization::Unpolarized,
        StructuralMode::SinglePoint,
        AtomicReference::unpolarized(vec![1.0; 2]),
        2.0,
        AtomicState::at_rest(vec![]),
    );
    init_electron_density(&mut ctx);
    ctx.counters.record_solve(false);
    assert_eq!(extrapolate_density(&mut ctx), ExtrapolationOutcome::Skipped);
    assert_eq!(ctx.extrapolation.deviation(0), &[0.0; 2]);
}

#[test]
fn test_combine_deviations_scenario() {
    let mut out = [0.0];
    combine_deviations(&[0.01], &[0.02], &[0.03], 0.5, -0.5, &mut out);
    // 1.5 * 0.01 + (-1.0) * 0.02 - (-0.5) * 0.03
    assert!((out[0] - 0.01).abs() < 1e-15);
}

#[test]
fn test_stage_extrapolated_density_clamps_negative_values() {
    let mut total = [0.0; 3];
    let clamped = stage_extrapolated_density(
        &mut total,
        &[0.1, 0.2, 0.3],
        &[-0.5, 0.1, -0.3],
        DENSITY_FLOOR,
    );
    assert_eq!(clamped, 1);
    assert_eq!(total[0], DENSITY_FLOOR);
    assert!((total[1] - 0.3).abs() < 1e-15);
    // Exactly zero is not negative
    assert_eq!(total[2], 0.0);
}

#[test]
fn test_history_normal_equations() {
    let p2 = [Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)];
    let p1 = [Vector3::new(0.1, 0.0, 0.0), Vector3::new(1.0, 0.1, 0.0)];
    let p0 = [Vector3::new(0.1, 0.2, 0.0), Vector3::new(1.3, 0.1, 0.0)];
    let next = [Vector3::new(0.15, 0.3, 0.0), Vector3::new(1.5, 0.15, 0.0)];
    let (ftf, rhs) = history_normal_equations(&p0, &p1, &p2, &next);

    assert!((ftf[(0, 0)] - 0.13).abs() < 1e-12);
    assert!(ftf[(0, 1)].abs() < 1e-12);
    assert_eq!(ftf[(0, 1)], ftf[(1, 0)]);
    assert!((ftf[(1, 1)] - 0.02).abs() < 1e-12);
    assert!((rhs[0] - 0.08).abs() < 1e-12);
    assert!((rhs[1] - 0.01).abs() < 1e-12);
}

fn md_context(policy: SingularHistoryPolicy) -> SolverContext<SerialGroup> {
    let positions = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.5, 0.0, 0.0)];
    let mut atoms = AtomicState::at_rest(positions);
    // Dyadic velocities keep every displacement exact
    atoms.velocities = vec![Vector3::new(0.125, 0.0, 0.0), Vector3::new(-0.25, 0.5, 0.0)];
    let mut ctx = context(
        SpinPolarization::Unpolarized,
        StructuralMode::MolecularDynamics { time_step: 2.0 },
        AtomicReference::unpolarized(vec![0.4, 0.3, 0.2, 0.1]),
        1.0,
        atoms,
    );
    ctx.params.singular_history = policy;
    ctx
}

/// Stand-in for the SCF: perturb the staged density a little and record the solve.
fn fake_solve(ctx: &mut SolverContext<SerialGroup>, step: usize) {
    for (i, rho) in ctx.density.total_mut().iter_mut().enumerate() {
        *rho += 0.01 * ((step + 1) * (i + 1)) as f64;
    }
    ctx.counters.record_solve(false);
    ctx.counters.md_count += 1;
}

fn advance_atoms(ctx: &mut SolverContext<SerialGroup>) {
    let StructuralMode::MolecularDynamics { time_step } = ctx.params.mode else {
        unreachable!()
    };
    let atoms = &mut ctx.atoms;
    for (p, v) in atoms.positions.iter_mut().zip(&atoms.velocities) {
        *p += v * time_step;
    }
}

#[test]
fn test_md_sequence_accumulates_then_extrapolates() {
    let mut ctx = md_context(SingularHistoryPolicy::Accept);
    let mut outcomes = Vec::new();

    for step in 0..4 {
        init_electron_density(&mut ctx);
        if step > 0 {
            assert!((integrated_charge(&ctx) - 1.0).abs() < 1e-10);
        }
        fake_solve(&mut ctx, step);
        outcomes.push(extrapolate_density(&mut ctx));
        if step < 2 {
            assert!(ctx.extrapolation.pending().is_none());
        }
        advance_atoms(&mut ctx);
    }

    assert_eq!(outcomes[0], ExtrapolationOutcome::Accumulating { net_solves: 1 });
    assert_eq!(outcomes[1], ExtrapolationOutcome::Accumulating { net_solves: 2 });

    // Constant velocity and a history that starts at rest: p1 == p2 on the
    // third solve, so only the first column of the fit survives.
    match outcomes[2] {
        ExtrapolationOutcome::Extrapolated { alpha, beta, rank } => {
            assert_eq!(rank, 1);
            assert!((alpha - 1.0).abs() < 1e-9);
            assert!(beta.abs() < 1e-9);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(matches!(
        outcomes[3],
        ExtrapolationOutcome::Extrapolated { .. }
    ));
    assert!(ctx.extrapolation.pending().is_some());

    // Predicted positions run one step ahead of the atoms' last solve
    let expected = ctx.atoms.positions[1] - ctx.atoms.velocities[1] * 2.0;
    assert!((ctx.extrapolation.positions(0)[1] - expected).norm() < 1e-12);
}

#[test]
fn test_rank_deficient_fit_can_fall_back_to_atomic_density() {
    let mut ctx = md_context(SingularHistoryPolicy::FallbackToAtomic);
    let mut last = ExtrapolationOutcome::Idle;
    for step in 0..3 {
        init_electron_density(&mut ctx);
        fake_solve(&mut ctx, step);
        last = extrapolate_density(&mut ctx);
        advance_atoms(&mut ctx);
    }
    assert_eq!(last, ExtrapolationOutcome::FellBack { rank: 1 });
    assert_eq!(ctx.extrapolation.pending().unwrap(), &[0.0; 4]);

    // The next guess is the atomic density, rescaled
    init_electron_density(&mut ctx);
    let reference_sum: f64 = ctx.reference.density.iter().sum();
    for (rho, rho_at) in ctx.density.total().iter().zip(&ctx.reference.density) {
        assert!((rho - rho_at / reference_sum).abs() < 1e-14);
    }
}

#[test]
fn test_extrapolation_matches_direct_solve() {
    let p2 = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)];
    let p1 = vec![Vector3::new(0.1, 0.0, 0.0), Vector3::new(1.0, 0.1, 0.0)];
    let p0 = vec![Vector3::new(0.1, 0.2, 0.0), Vector3::new(1.3, 0.1, 0.0)];

    let mut atoms = AtomicState::at_rest(p0.clone());
    atoms.velocities = vec![Vector3::new(0.05, 0.1, 0.0), Vector3::new(0.2, 0.05, 0.0)];
    let mut ctx = context(
        SpinPolarization::Unpolarized,
        StructuralMode::MolecularDynamics { time_step: 1.0 },
        AtomicReference::unpolarized(vec![1.0, 2.0, 3.0]),
        6.0,
        atoms,
    );
    ctx.counters.elecgs_count = 3;
    ctx.counters.md_count = 3;

    {
        let state = &mut ctx.extrapolation;
        state.positions_mut().push(p2);
        state.positions_mut().push(p1);
        state.positions_mut().push(p0.clone());
        state.predicted_mut().copy_from_slice(&p0);
        state.deviations_mut().push(vec![0.03, -0.01, 0.02]);
        state.deviations_mut().push(vec![0.02, 0.0, -0.04]);
    }
    ctx.density
        .total_mut()
        .copy_from_slice(&[1.01, 2.02, 2.97]);

    let outcome = extrapolate_density(&mut ctx);
    let ExtrapolationOutcome::Extrapolated { alpha, beta, rank } = outcome else {
        panic!("unexpected outcome {:?}", outcome);
    };
    assert_eq!(rank, 2);
    assert!((alpha - 0.08 / 0.13).abs() < 1e-10);
    assert!((beta - 0.5).abs() < 1e-10);

    let (ftf, rhs) = history_normal_equations(
        ctx.extrapolation.positions(1),
        ctx.extrapolation.positions(2),
        &[Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)],
        ctx.extrapolation.positions(0),
    );
    let direct = solve_lsq(&ftf, &rhs, -1.0);
    assert_eq!(direct.x[0], alpha);
    assert_eq!(direct.x[1], beta);

    let dev0 = ctx.extrapolation.deviation(0).to_vec();
    let dev1 = ctx.extrapolation.deviation(1).to_vec();
    let dev2 = ctx.extrapolation.deviation(2).to_vec();
    assert!((dev0[2] - (-0.03)).abs() < 1e-14);
    assert_eq!(dev1, vec![0.02, 0.0, -0.04]);
    assert_eq!(dev2, vec![0.03, -0.01, 0.02]);

    let pending = ctx.extrapolation.pending().unwrap();
    for i in 0..3 {
        let expected = (1.0 + alpha) * dev0[i] + (beta - alpha) * dev1[i] - beta * dev2[i];
        assert_eq!(pending[i], expected);
    }
}

#[test]
fn test_stress_only_solves_do_not_count_toward_history() {
    let mut ctx = md_context(SingularHistoryPolicy::Accept);
    for step in 0..2 {
        init_electron_density(&mut ctx);
        fake_solve(&mut ctx, step);
        extrapolate_density(&mut ctx);
        advance_atoms(&mut ctx);
    }

    // Third solve at the same geometry, spent on the stress only
    init_electron_density(&mut ctx);
    ctx.counters.record_solve(true);
    assert_eq!(ctx.counters.elecgs_count, 3);
    assert_eq!(
        extrapolate_density(&mut ctx),
        ExtrapolationOutcome::Accumulating { net_solves: 2 }
    );
    assert!(ctx.extrapolation.pending().is_none());

    init_electron_density(&mut ctx);
    fake_solve(&mut ctx, 2);
    assert!(matches!(
        extrapolate_density(&mut ctx),
        ExtrapolationOutcome::Extrapolated { .. }
    ));
    assert!(ctx.extrapolation.pending().is_some());
}

#[test]
fn test_negative_extrapolated_density_is_floored() {
    let p2 = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)];
    let p1 = vec![Vector3::new(0.1, 0.0, 0.0), Vector3::new(1.0, 0.1, 0.0)];
    let p0 = vec![Vector3::new(0.1, 0.2, 0.0), Vector3::new(1.3, 0.1, 0.0)];

    let mut atoms = AtomicState::at_rest(p0.clone());
    atoms.velocities = vec![Vector3::new(0.05, 0.1, 0.0), Vector3::new(0.2, 0.05, 0.0)];
    let mut ctx = context(
        SpinPolarization::Unpolarized,
        StructuralMode::MolecularDynamics { time_step: 1.0 },
        AtomicReference::unpolarized(vec![1.0, 1.0]),
        1.0,
        atoms,
    );
    ctx.counters.elecgs_count = 3;
    ctx.counters.md_count = 3;

    {
        let state = &mut ctx.extrapolation;
        state.positions_mut().push(p2);
        state.positions_mut().push(p1);
        state.positions_mut().push(p0.clone());
        state.predicted_mut().copy_from_slice(&p0);
        // Becomes the oldest deviation once the latest one is recorded
        state.deviations_mut().push(vec![4.0, 0.0]);
        state.deviations_mut().push(vec![0.0, 0.0]);
    }
    // Converged density equals the atomic one: the latest deviation is zero
    ctx.density.total_mut().copy_from_slice(&[1.0, 1.0]);

    let outcome = extrapolate_density(&mut ctx);
    let ExtrapolationOutcome::Extrapolated { beta, .. } = outcome else {
        panic!("unexpected outcome {:?}", outcome);
    };
    assert!((beta - 0.5).abs() < 1e-10);
    let pending = ctx.extrapolation.pending().unwrap();
    assert!(pending[0] < -1.0, "{}", pending[0]);
    assert_eq!(pending[1], 0.0);

    ctx.counters.record_solve(false);
    assert_eq!(init_electron_density(&mut ctx), Participation::Active);

    let floor = ctx.params.density_floor;
    let scale = 1.0 / (floor + 1.0);
    let total = ctx.density.total();
    assert!((total[0] - floor * scale).abs() < 1e-12 * floor);
    assert!((total[1] - scale).abs() < 1e-14);
    assert!(total.iter().all(|&rho| rho > 0.0));
    assert!((integrated_charge(&ctx) - 1.0).abs() < 1e-14);
}
