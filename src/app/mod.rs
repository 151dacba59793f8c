mod geometry;
mod report;
mod runner;

pub use geometry::{build_geometry, superposition, Geometry};
#[cfg(feature = "mpi")]
pub use runner::run_guess_mpi;
pub use runner::{advance_atoms, run_guess, RunPlan, StepReport};

use self::report::{report_plan, report_summary};
use crate::config::{Args, Config};
use crate::io::{setup_output, write_step_table};
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use std::fs;
use tracing::info;

pub struct GuessApplication {
    args: Args,
    config: Config,
}

impl GuessApplication {
    pub fn from_cli() -> Result<Self> {
        let args = Args::parse();
        let config = load_config(&args)?;
        Ok(Self { args, config })
    }

    pub fn run(self) -> Result<()> {
        setup_output(self.args.output.as_ref());
        info!("Configuration loaded from: {}", self.args.config_file);

        let plan = RunPlan::from_config(&self.config, &self.args)?;
        report_plan(&plan);

        #[cfg(feature = "mpi")]
        let reports = run_guess_mpi(&plan)?;
        #[cfg(not(feature = "mpi"))]
        let reports = run_guess(&plan)?;
        report_summary(&reports);

        // Logs went to a file; still show the results on the terminal
        if self.args.output.is_some() {
            write_step_table(&mut std::io::stdout().lock(), &reports)?;
        }
        Ok(())
    }
}

pub fn load_config(args: &Args) -> Result<Config> {
    let config_content = fs::read_to_string(&args.config_file)
        .wrap_err_with(|| format!("Unable to read configuration file: {}", args.config_file))?;

    let config = serde_yml::from_str::<Config>(&config_content)
        .wrap_err("Failed to parse configuration file")?
        .with_defaults();

    Ok(config)
}
