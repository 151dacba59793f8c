use super::geometry::{build_geometry, superposition, Geometry};
use super::report::report_step;
use crate::comm::{ProcessGroup, ThreadGroup};
use crate::config::{Args, Config, StructuralParams};
use crate::context::{AtomicState, GuessParams, OrbitalSeeding, SolverContext, StructuralMode};
use crate::density_impl::{extrapolate_density, init_electron_density, ExtrapolationOutcome};
use crate::grid::{block_domain, mesh_coords, GridDescriptor, Integration};
use crate::orbital_impl::{init_orbitals, OrbitalLayout, OrbitalSet};
use color_eyre::eyre::{bail, ensure, eyre, Result};
use itertools::izip;
use std::thread;
use tracing::info;

/// Everything a run needs, resolved from the configuration and the CLI.
pub struct RunPlan {
    pub params: GuessParams,
    pub geometry: Geometry,
    pub shape: [usize; 3],
    pub spacing: f64,
    /// Process mesh; one simulated rank per mesh point
    pub dims: [usize; 3],
    pub nstates: usize,
    pub nkpt: usize,
    pub gamma_point: bool,
    pub steps: usize,
}

impl RunPlan {
    /// Merge `config` (already defaulted) with the command-line overrides.
    pub fn from_config(config: &Config, args: &Args) -> Result<Self> {
        let mut geometry = build_geometry(config)?;
        ensure!(!geometry.elements.is_empty(), "Geometry contains no atoms");
        if let StructuralParams::Relax { step_factor } = config.structural {
            geometry.atoms.relax_factor = step_factor;
        }

        let charge = args
            .charge
            .or(config.charge)
            .unwrap_or_else(|| geometry.electron_count());
        let mut params = config.guess_params(charge);
        if let Some(seeding) = &args.seeding {
            params.seeding = parse_seeding(seeding)?;
        }

        let dims = match args.ranks {
            Some(n) => [1, 1, n],
            None => config.grid.decomposition.unwrap_or([1, 1, 1]),
        };
        ensure!(
            dims.iter().all(|&n| n > 0),
            "Process mesh {:?} needs at least one rank per axis",
            dims
        );
        let gamma_point = config.orbitals.gamma_point.unwrap_or(true);
        let nkpt = config.orbitals.kpoints.unwrap_or(1);
        ensure!(
            !gamma_point || nkpt == 1,
            "A gamma-point run samples a single k-point, got {}",
            nkpt
        );

        Ok(RunPlan {
            params,
            geometry,
            shape: config.grid.shape,
            spacing: config.grid.spacing.unwrap_or(0.5),
            dims,
            nstates: config.orbitals.bands.unwrap_or(8),
            nkpt,
            gamma_point,
            steps: args.steps.or(config.steps).unwrap_or(1),
        })
    }

    pub fn num_ranks(&self) -> usize {
        self.dims.iter().product()
    }
}

fn parse_seeding(name: &str) -> Result<OrbitalSeeding> {
    match name.to_lowercase().as_str() {
        "seeded" => Ok(OrbitalSeeding::Seeded),
        "process_local" | "process-local" => Ok(OrbitalSeeding::ProcessLocal),
        _ => bail!("Unknown orbital seeding '{}', use seeded or process_local", name),
    }
}

/// Group-wide results of one electronic solve.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step: usize,
    /// Integrated density of the staged guess
    pub charge: f64,
    pub extrapolation: ExtrapolationOutcome,
    /// Sum of all orbital coefficients (real, imaginary)
    pub orbital_checksum: (f64, f64),
}

/// Run the guess loop on `plan.num_ranks()` threads, one per rank. Every rank
/// sees the same reduced values; rank 0's reports are returned.
pub fn run_guess(plan: &RunPlan) -> Result<Vec<StepReport>> {
    let nprocs = plan.num_ranks();
    info!(
        "Running {} step(s) on {} rank(s), process mesh {:?}",
        plan.steps, nprocs, plan.dims
    );

    // Build every context before any rank enters a collective
    let contexts = ThreadGroup::create(nprocs)
        .into_iter()
        .enumerate()
        .map(|(rank, group)| build_context(plan, rank, group.clone(), group))
        .collect::<Result<Vec<_>>>()?;

    let mut per_rank = thread::scope(|s| {
        let handles: Vec<_> = contexts
            .into_iter()
            .map(|ctx| s.spawn(move || run_rank(plan, ctx)))
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, h)| h.join().map_err(|_| eyre!("Rank {} panicked", rank)))
            .collect::<Result<Vec<_>>>()
    })?;

    Ok(per_rank.swap_remove(0))
}

/// Run one rank per MPI process; the world size must match the process mesh.
#[cfg(feature = "mpi")]
pub fn run_guess_mpi(plan: &RunPlan) -> Result<Vec<StepReport>> {
    use crate::comm::MpiGroup;
    use mpi::traits::Communicator;

    let universe = mpi::initialize().ok_or_else(|| eyre!("MPI initialization failed"))?;
    let world = universe.world();
    ensure!(
        world.size() as usize == plan.num_ranks(),
        "Process mesh {:?} needs {} MPI processes, got {}",
        plan.dims,
        plan.num_ranks(),
        world.size()
    );
    let rank = world.rank() as usize;
    let ctx = build_context(
        plan,
        rank,
        MpiGroup::new(world.duplicate()),
        MpiGroup::new(world.duplicate()),
    )?;
    Ok(run_rank(plan, ctx))
}

fn build_context<G: ProcessGroup>(
    plan: &RunPlan,
    rank: usize,
    density_group: G,
    orbital_group: G,
) -> Result<SolverContext<G>> {
    let domain = block_domain(plan.shape, plan.dims, mesh_coords(rank, plan.dims))?;
    let grid = GridDescriptor::new(plan.shape, domain)?;
    let geometry = &plan.geometry;
    let reference = superposition(
        &geometry.elements,
        &geometry.atoms.positions,
        &geometry.magmoms,
        &grid,
        plan.spacing,
        plan.params.spin,
    );

    let mut layout = OrbitalLayout::serial(
        grid.clone(),
        plan.params.spin,
        plan.nstates,
        plan.nkpt,
        plan.gamma_point,
    );
    layout.spin_rank = rank;

    SolverContext::new(
        plan.params.clone(),
        grid,
        Integration::Uniform {
            dv: plan.spacing.powi(3),
        },
        geometry.atoms.clone(),
        reference,
        Some(density_group),
    )?
    .with_orbitals(layout, Some(orbital_group))
}

fn group_sum<G: ProcessGroup>(ctx: &SolverContext<G>, value: f64) -> f64 {
    match &ctx.density_group {
        Some(group) => group.all_reduce_sum(value),
        None => value,
    }
}

fn run_rank<G: ProcessGroup>(plan: &RunPlan, mut ctx: SolverContext<G>) -> Vec<StepReport> {
    let mode = ctx.params.mode;
    let is_root = ctx.density_group.as_ref().map_or(false, |g| g.rank() == 0);
    let mut reports = Vec::with_capacity(plan.steps);

    for step in 0..plan.steps {
        init_electron_density(&mut ctx);
        init_orbitals(&mut ctx);

        let charge = group_sum(&ctx, ctx.integration.integrate(ctx.density.total()));
        let (re, im) = ctx
            .orbitals
            .as_ref()
            .map_or((0.0, 0.0), OrbitalSet::checksum);
        let orbital_checksum = (group_sum(&ctx, re), group_sum(&ctx, im));

        // The staged guess stands in for the converged density
        ctx.counters.record_solve(false);
        if let StructuralMode::MolecularDynamics { .. } = mode {
            ctx.counters.md_count += 1;
        }
        let extrapolation = extrapolate_density(&mut ctx);

        advance_atoms(&mut ctx.atoms, mode);
        if mode.is_structural() {
            let geometry = &plan.geometry;
            ctx.reference = superposition(
                &geometry.elements,
                &ctx.atoms.positions,
                &geometry.magmoms,
                &ctx.grid,
                plan.spacing,
                ctx.params.spin,
            );
        }

        let report = StepReport {
            step,
            charge,
            extrapolation,
            orbital_checksum,
        };
        if is_root {
            report_step(&report);
        }
        reports.push(report);
    }
    reports
}

/// Move the atoms to the next structural step: `x += dt·v` for MD,
/// `x += fac·(d ∘ mask)` for relaxation.
pub fn advance_atoms(atoms: &mut AtomicState, mode: StructuralMode) {
    match mode {
        StructuralMode::SinglePoint => {}
        StructuralMode::MolecularDynamics { time_step } => {
            for (x, v) in izip!(&mut atoms.positions, &atoms.velocities) {
                *x += v * time_step;
            }
        }
        StructuralMode::Relaxation => {
            let fac = atoms.relax_factor;
            for (x, d, mask) in izip!(&mut atoms.positions, &atoms.search_direction, &atoms.movable) {
                *x += d.component_mul(mask) * fac;
            }
        }
    }
}
