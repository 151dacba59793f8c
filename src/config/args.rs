//! Command-line argument parsing for initial-guess runs

use clap::Parser;

/// Density and orbital initial guess driver with YAML configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config_file: String,

    /// Split the grid along z over this many ranks (overrides grid.decomposition)
    #[arg(long)]
    pub ranks: Option<usize>,

    /// Override the number of electronic solves
    #[arg(long)]
    pub steps: Option<usize>,

    /// Orbital seeding (seeded or process_local)
    #[arg(long)]
    pub seeding: Option<String>,

    /// Override total electron count
    #[arg(long)]
    pub charge: Option<f64>,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,
}
