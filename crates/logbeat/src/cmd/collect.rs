//! Collect command - receive lines and store them in month partitions

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use logbeat_collector::{IngestServer, TursoStore};
use logbeat_config::Config;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::wait_for_shutdown;

/// Collect command arguments
#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Database file (overrides [collector].database)
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Listen port (overrides [transport].port)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Run the collect command
pub async fn run(args: CollectArgs, mut config: Config) -> Result<()> {
    if let Some(database) = args.database {
        config.collector.database = database;
    }
    if let Some(port) = args.port {
        config.transport.port = port;
    }

    config
        .validate_collector()
        .context("invalid collector configuration")?;

    let store = TursoStore::open(&config.collector.database)
        .await
        .with_context(|| {
            format!(
                "failed to open database {}",
                config.collector.database.display()
            )
        })?;

    let server = IngestServer::new(&config.collector, &config.transport, Arc::new(store));
    let cancel = CancellationToken::new();

    let serve = server.run(cancel.clone());
    tokio::pin!(serve);

    let snapshot = tokio::select! {
        result = &mut serve => result.context("collector stopped unexpectedly")?,
        signal = wait_for_shutdown() => {
            signal.context("failed to install signal handler")?;
            info!("shutdown signal received, stopping collector");
            cancel.cancel();
            serve.await.context("collector shutdown failed")?
        }
    };

    info!(
        records_written = snapshot.records_written,
        "collector shutdown complete"
    );
    Ok(())
}
