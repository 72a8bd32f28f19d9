//! Shipper error types

use std::io;
use std::path::PathBuf;

use logbeat_protocol::ProtocolError;
use thiserror::Error;

/// Errors that stop the shipper
#[derive(Debug, Error)]
pub enum ShipperError {
    /// None of the configured watch paths could be opened
    #[error("no watch targets could be opened: {paths}")]
    NoWatchTargets { paths: String },

    /// Reading or writing the durable offsets file failed
    #[error("offsets file '{path}': {source}")]
    OffsetStore {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Offsets file exists but is not valid JSON
    #[error("offsets file '{path}' is corrupt: {source}")]
    OffsetFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The delivery queue consumer went away
    #[error("delivery queue closed")]
    QueueClosed,

    /// A blocking file task panicked or was cancelled
    #[error("file task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ShipperError {
    pub(crate) fn no_watch_targets(paths: &[PathBuf]) -> Self {
        Self::NoWatchTargets {
            paths: paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Errors on the way from the queue to the collector
///
/// All of these are retried by the sender; none drop a message.
#[derive(Debug, Error)]
pub enum SendError {
    /// TCP connect failed or timed out
    #[error("connection failed to {target}: {source}")]
    ConnectionFailed {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Handshake was refused or broken
    #[error("handshake with {target} failed: {source}")]
    Handshake {
        target: String,
        #[source]
        source: ProtocolError,
    },

    /// Write failed
    #[error("write failed: {0}")]
    WriteFailed(#[from] io::Error),

    /// Write did not finish within the write timeout
    #[error("write timed out")]
    Timeout,
}
