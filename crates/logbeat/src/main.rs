//! Logbeat - ship log files to a partitioning collector
//!
//! # Usage
//!
//! ```bash
//! # Tail the configured files and forward new lines
//! logbeat --config /etc/logbeat/shipper.toml ship
//!
//! # Receive lines and store them in month-partitioned tables
//! logbeat --config /etc/logbeat/collector.toml collect
//! ```
//!
//! The shipper reopens its files on SIGUSR1 (after rotation) and SIGUSR2
//! (after a config change); SIGTERM or Ctrl+C drains the queue and exits.

mod cmd;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use logbeat_config::{Config, LogConfig, LogFormat, LogOutput};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Config files tried when `--config` is not given
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["logbeat.toml", "configs/logbeat.toml"];

/// Logbeat - log shipper and collector
#[derive(Parser, Debug)]
#[command(name = "logbeat")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tail log files and forward new lines to a collector
    Ship(cmd::ship::ShipArgs),

    /// Receive shipped lines and store them
    Collect(cmd::collect::CollectArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_path) = load_config(cli.config.as_deref())?;
    init_logging(&config.log, cli.log_level.as_deref())?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(defaults)".to_string()),
        "logbeat starting"
    );

    let result = match cli.command {
        Command::Ship(args) => cmd::ship::run(args, config, config_path).await,
        Command::Collect(args) => cmd::collect::run(args, config).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "logbeat failed");
    }
    result
}

/// Load the explicit config file, else the first default that exists,
/// else built-in defaults
///
/// Returns the path actually loaded so the shipper can re-read it on reload.
fn load_config(explicit: Option<&Path>) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        let config = Config::from_file(path).context("failed to load configuration")?;
        return Ok((config, Some(path.to_path_buf())));
    }

    for candidate in DEFAULT_CONFIG_PATHS {
        let path = Path::new(candidate);
        if path.exists() {
            let config = Config::from_file(path).context("failed to load configuration")?;
            return Ok((config, Some(path.to_path_buf())));
        }
    }

    Ok((Config::default(), None))
}

/// Resolve log level: CLI flag > config file > default "info"
fn resolve_log_level(cli_level: Option<&str>, config: &LogConfig) -> String {
    match cli_level {
        Some(level) => level.to_string(),
        None => config.level.as_str().to_string(),
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(config: &LogConfig, cli_level: Option<&str>) -> Result<()> {
    let level = resolve_log_level(cli_level, config);
    let filter = EnvFilter::try_new(&level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let (writer, ansi) = match &config.output {
        LogOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), true),
        LogOutput::Stderr => (BoxMakeWriter::new(std::io::stderr), true),
        LogOutput::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {path}"))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
    };

    match config.format {
        LogFormat::Console => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_ansi(ansi)
                    .with_writer(writer),
            )
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true).with_writer(writer))
            .with(filter)
            .init(),
    }

    Ok(())
}
