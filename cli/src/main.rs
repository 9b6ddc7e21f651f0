//! CLI entrypoint for parley
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

mod chat;
mod commands;
mod inspect;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Cli, Command};
use parley_infrastructure::ConfigLoader;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.show_config {
        ConfigLoader::print_config_sources(cli.config.as_ref());
        return Ok(());
    }

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref()).context("loading configuration")?
    };
    config.validate()?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(cli.verbose, config.logging.file.as_deref());

    info!("Starting parley");

    match cli.command {
        Some(Command::Inspect { path }) => inspect::run(&path),
        Some(Command::Chat(args)) => chat::run(&config, args).await,
        None => chat::run(&config, Default::default()).await,
    }
}

/// Initialize logging based on verbosity level, optionally mirroring it
/// into a daily rotating file.
fn init_logging(verbose: u8, file_dir: Option<&str>) -> Option<WorkerGuard> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace", // -vvv or more
    };

    let (file_layer, guard) = match file_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "parley.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new(level));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::new(level)),
        )
        .with(file_layer)
        .init();

    guard
}
