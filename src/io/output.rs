//! Output formatting and logging utilities

use crate::app::StepReport;
use crate::density_impl::ExtrapolationOutcome;
use color_eyre::eyre::Result;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::time::SystemTime as StdSystemTime;
use tracing::info;
use tracing_subscriber::{
    fmt::format::Writer, fmt::layer, fmt::time::FormatTime, layer::SubscriberExt,
    util::SubscriberInitExt, Registry,
};

/// Wall-clock timer with whole-second resolution
struct SecondPrecisionTimer;

impl FormatTime for SecondPrecisionTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let secs = StdSystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        write!(w, "{:02}:{:02}:{:02}", (secs / 3600) % 24, (secs / 60) % 60, secs % 60)
    }
}

/// Setup output logging to file or stdout
pub fn setup_output(output_path: Option<&String>) {
    match output_path {
        Some(path) => match File::create(path) {
            Ok(log) => {
                let file_layer = layer()
                    .with_writer(log)
                    .with_timer(SecondPrecisionTimer)
                    .with_ansi(false);
                Registry::default().with(file_layer).init();
                info!("Output will be written to: {}", path);
            }
            Err(e) => eprintln!("Could not create output file {}: {}", path, e),
        },
        None => {
            let stdout_layer = layer()
                .with_writer(std::io::stdout)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(true);
            Registry::default().with(stdout_layer).init();
        }
    }
}

/// One line per step: step, charge, fit coefficients, orbital checksum.
pub fn write_step_table<W: Write>(writer: &mut W, reports: &[StepReport]) -> Result<()> {
    writeln!(
        writer,
        "{:>5} {:>18} {:>12} {:>12} {:>18}",
        "step", "charge", "alpha", "beta", "checksum"
    )?;
    for r in reports {
        let (alpha, beta) = match r.extrapolation {
            ExtrapolationOutcome::Extrapolated { alpha, beta, .. } => {
                (format!("{:+.6}", alpha), format!("{:+.6}", beta))
            }
            _ => ("-".to_string(), "-".to_string()),
        };
        writeln!(
            writer,
            "{:>5} {:>18.10} {:>12} {:>12} {:>+18.8e}",
            r.step, r.charge, alpha, beta, r.orbital_checksum.0
        )?;
    }
    Ok(())
}
