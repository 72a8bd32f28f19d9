//! Ship command - tail log files and forward new lines
//!
//! OS signals become [`ControlCommand`]s on the shipper's control channel:
//!
//! | signal          | command                                   |
//! |-----------------|-------------------------------------------|
//! | SIGUSR1         | `Rotate`                                  |
//! | SIGUSR2         | `Reload`, with `[shipper].watch` re-read  |
//! | SIGTERM, Ctrl+C | `Shutdown`                                |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use logbeat_config::Config;
use logbeat_shipper::{ControlCommand, Shipper};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Ship command arguments
#[derive(Args, Debug)]
pub struct ShipArgs {
    /// File to tail, repeatable (replaces [shipper].watch)
    #[arg(short, long)]
    pub watch: Vec<PathBuf>,
}

/// Run the ship command
pub async fn run(args: ShipArgs, mut config: Config, config_path: Option<PathBuf>) -> Result<()> {
    // Watch paths given on the command line are not re-read on reload
    let reload_from = if args.watch.is_empty() {
        config_path
    } else {
        config.shipper.watch = args.watch;
        None
    };

    config
        .validate_shipper()
        .context("invalid shipper configuration")?;

    info!(
        collector = %config.transport.address(),
        files = config.shipper.watch.len(),
        "starting shipper"
    );

    let shipper =
        Shipper::start(config.shipper, &config.transport).context("failed to start shipper")?;

    let (control_tx, control_rx) = mpsc::channel(16);
    let signals = SignalForwarder::install(control_tx, reload_from)
        .context("failed to install signal handlers")?;
    let forwarder = tokio::spawn(signals.run());

    let snapshot = shipper.run(control_rx).await;
    forwarder.abort();

    let snapshot = snapshot.context("shipper failed")?;
    info!(
        messages_sent = snapshot.messages_sent,
        "shipper shutdown complete"
    );
    Ok(())
}

/// Turns OS signals into control commands
struct SignalForwarder {
    control: mpsc::Sender<ControlCommand>,
    reload_from: Option<PathBuf>,
    #[cfg(unix)]
    rotate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    reload: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl SignalForwarder {
    fn install(
        control: mpsc::Sender<ControlCommand>,
        reload_from: Option<PathBuf>,
    ) -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            Ok(Self {
                control,
                reload_from,
                rotate: signal(SignalKind::user_defined1())?,
                reload: signal(SignalKind::user_defined2())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {
                control,
                reload_from,
            })
        }
    }

    async fn run(mut self) {
        loop {
            let command = self.next().await;
            let shutdown = command == ControlCommand::Shutdown;

            if self.control.send(command).await.is_err() || shutdown {
                break;
            }
        }
    }

    #[cfg(unix)]
    async fn next(&mut self) -> ControlCommand {
        tokio::select! {
            _ = self.rotate.recv() => {
                info!("SIGUSR1: rotating watched files");
                ControlCommand::Rotate
            }
            _ = self.reload.recv() => {
                info!("SIGUSR2: reloading watch list");
                ControlCommand::Reload(reload_watch_list(self.reload_from.as_deref()))
            }
            _ = self.terminate.recv() => {
                info!("SIGTERM: draining and stopping");
                ControlCommand::Shutdown
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt: draining and stopping");
                ControlCommand::Shutdown
            }
        }
    }

    #[cfg(not(unix))]
    async fn next(&mut self) -> ControlCommand {
        let _ = tokio::signal::ctrl_c().await;
        info!("interrupt: draining and stopping");
        ControlCommand::Shutdown
    }
}

/// Re-read `[shipper].watch` from the config file
///
/// `None` keeps the current list: there is no file to read, it failed to
/// load, or it names no paths.
fn reload_watch_list(config_path: Option<&Path>) -> Option<Vec<PathBuf>> {
    let path = config_path?;

    match Config::from_file(path) {
        Ok(config) if config.shipper.watch.is_empty() => {
            warn!(config = %path.display(), "reloaded config has no watch files, keeping current list");
            None
        }
        Ok(config) => Some(config.shipper.watch),
        Err(e) => {
            warn!(config = %path.display(), error = %e, "config reload failed, keeping current list");
            None
        }
    }
}
