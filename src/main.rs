//! Main entry point for the zip2zip CLI application.
//!
//! Reads the source archive named by `ENV_INPUT_ZIP_FILENAME` (or the first
//! argument), writes the filtered archive to stdout and logs to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use zip2zip::{CancelToken, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level());

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr; stdout carries the archive. `RUST_LOG` overrides the quiet level.
fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> Result<()> {
    let settings = cli.settings()?;
    let config = settings.convert_config();

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping before the next entry");
            on_interrupt.cancel();
        }
    });

    let stats = config
        .zip_file_to_stdout(&cancel, &settings.input)
        .await
        .with_context(|| format!("failed to filter {}", settings.input.display()))?;

    info!(
        copied = stats.copied,
        skipped_by_filter = stats.skipped_by_filter,
        skipped_by_size = stats.skipped_by_size,
        "filtered archive written"
    );
    Ok(())
}
