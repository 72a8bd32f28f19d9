//! Logbeat Shipper
//!
//! Tails growing log files and forwards every new line to a collector.
//!
//! # Pipeline
//!
//! ```text
//! WatchSet (FileCursor per file) -> backlog -> DeliveryQueue -> Sender -> collector
//!                 ^
//!        RotationController (rotate / reload)
//! ```
//!
//! - **Tailing**: each poll reads at most `batch_size` messages across all
//!   cursors, leaving the rest for the next poll. Partial lines wait for
//!   their newline.
//! - **Backpressure**: the delivery queue is bounded; when it is full the
//!   tail loop stops reading.
//! - **At-least-once**: a message is marked done only after it was written;
//!   a failed write is repeated on the next connection.
//! - **Graceful shutdown**: the queue is drained before the sender stops.
//!
//! # Example
//!
//! ```ignore
//! use logbeat_shipper::{ControlCommand, Shipper};
//! use tokio::sync::mpsc;
//!
//! let shipper = Shipper::start(config.shipper, &config.transport)?;
//! let (control_tx, control_rx) = mpsc::channel(16);
//! let snapshot = shipper.run(control_rx).await?;
//! ```

mod assembler;
mod cursor;
mod error;
mod metrics;
mod offsets;
mod queue;
mod rotation;
mod sender;
mod shipper;
mod tailer;

pub use assembler::SlowLogAssembler;
pub use cursor::{FileCursor, SeekTo};
pub use error::{SendError, ShipperError};
pub use metrics::{MetricsSnapshot, ShipperMetrics};
pub use offsets::{OffsetMap, OffsetStore, SavedOffset};
pub use queue::{LogMessage, QueueClosed, QueueConsumer, QueueProducer, QueueSlot, bounded};
pub use rotation::RotationController;
pub use sender::{Backoff, Connector, Link, Sender, TcpConnector, TcpLink};
pub use shipper::{ControlCommand, Shipper};
pub use tailer::{CursorPosition, Tailer, WatchOptions, WatchSet};

/// Result type for shipper operations
pub type Result<T> = std::result::Result<T, ShipperError>;
