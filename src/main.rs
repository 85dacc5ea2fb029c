//! CLI entry point for ion_gauge_daq.
//!
//! Polls an ionization gauge at a fixed interval and appends the readings to a
//! CSV or HDF5 store.
//!
//! # Usage
//!
//! ```bash
//! ion_gauge_daq gauge.ini recording.ini
//! ion_gauge_daq gauge.ini recording.ini --log-level debug --log-format json
//! ```
//!
//! Ctrl-C stops the run at the next interval boundary; the process then exits 0.

use anyhow::{Context, Result};
use clap::Parser;
use ion_gauge_daq::app;
use ion_gauge_daq::config::AppConfig;
use ion_gauge_daq::logging::{self, OutputFormat, TracingConfig};
use ion_gauge_daq::recorder::stop_channel;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ion_gauge_daq")]
#[command(about = "Record vacuum gauge pressures over a serial link", long_about = None)]
struct Cli {
    /// Gauge configuration file (INI, [Serial] section)
    gauge_config: PathBuf,

    /// Recording configuration file (INI, [Logging] section)
    recording_config: PathBuf,

    /// Log level when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", value_parser = logging::parse_log_level)]
    log_level: tracing::Level,

    /// Diagnostic output format on stderr
    #[arg(long, default_value = "pretty", value_parser = parse_log_format)]
    log_format: OutputFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbose = cli.log_level >= tracing::Level::DEBUG;
    logging::init(
        TracingConfig::new(cli.log_level)
            .with_format(cli.log_format)
            .with_file_and_line(verbose),
    )
    .map_err(anyhow::Error::msg)?;

    if let Err(e) = run(cli).await {
        tracing::error!(error = %format!("{e:#}"), "recording failed");
        return Err(e);
    }
    Ok(())
}

fn parse_log_format(s: &str) -> Result<OutputFormat, String> {
    s.parse()
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(&cli.gauge_config, &cli.recording_config).with_context(|| {
        format!(
            "Failed to load configuration from {} and {}",
            cli.gauge_config.display(),
            cli.recording_config.display()
        )
    })?;

    let (stop_handle, stop_signal) = stop_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping at next interval boundary");
            stop_handle.stop();
        }
    });

    let summary = app::record(&config, stop_signal).await?;
    tracing::info!(
        state = %summary.state,
        records = summary.records_written,
        first_index = summary.first_index,
        cancelled = summary.cancelled,
        "run complete"
    );
    Ok(())
}
