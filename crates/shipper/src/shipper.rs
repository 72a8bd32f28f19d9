//! Shipper assembly
//!
//! Owns the watch set, the delivery queue and the sender task, and runs
//! the tail loop. External events arrive as [`ControlCommand`]s on a
//! channel and are handled between polls, so rotation never interleaves
//! with a read pass.
//!
//! Lines that were read but not yet enqueued sit in a local backlog.
//! Final lines from a rotation are appended to it, which keeps them ahead
//! of anything read from the new files.
//!
//! # Shutdown order
//!
//! 1. stop tailing and flush partial slow-log blocks
//! 2. enqueue the backlog and wait for the queue to drain (bounded by
//!    `drain_timeout` when set)
//! 3. cancel the sender
//! 4. persist offsets, if enabled and the drain completed
//! 5. close the files and log the final counters

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use logbeat_config::{ShipperConfig, StartPosition, TransportConfig};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cursor::SeekTo;
use crate::error::ShipperError;
use crate::metrics::{MetricsSnapshot, ShipperMetrics};
use crate::offsets::{OffsetMap, OffsetStore};
use crate::queue::{self, LogMessage, QueueClosed, QueueProducer};
use crate::rotation::RotationController;
use crate::sender::{Backoff, Connector, Sender, TcpConnector};
use crate::tailer::{Tailer, WatchOptions, WatchSet};

/// Out-of-band requests to a running shipper
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Files were rotated externally; capture their tail and reopen at end
    Rotate,
    /// Reopen the watch list, optionally replaced, keeping known offsets
    Reload(Option<Vec<PathBuf>>),
    /// Drain and stop
    Shutdown,
}

pub struct Shipper<C: Connector = TcpConnector> {
    config: ShipperConfig,
    watch: Arc<Mutex<WatchSet>>,
    rotation: RotationController,
    offsets: Option<OffsetStore>,
    metrics: Arc<ShipperMetrics>,
    connector: C,
    backoff: Backoff,
}

impl Shipper<TcpConnector> {
    /// Open the watch files and prepare a TCP sender
    ///
    /// # Errors
    ///
    /// `NoWatchTargets` when none of the configured files can be opened.
    pub fn start(config: ShipperConfig, transport: &TransportConfig) -> Result<Self, ShipperError> {
        let connector = TcpConnector::new(transport);
        Self::with_connector(config, connector, Backoff::from_transport(transport))
    }
}

impl<C: Connector> Shipper<C> {
    /// Open the watch files and deliver through `connector`
    pub fn with_connector(
        config: ShipperConfig,
        connector: C,
        backoff: Backoff,
    ) -> Result<Self, ShipperError> {
        if config.watch.is_empty() {
            return Err(ShipperError::no_watch_targets(&config.watch));
        }

        let offsets = config.offsets_file.as_ref().map(OffsetStore::new);
        let saved = match &offsets {
            Some(store) => store.load().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring saved offsets");
                OffsetMap::new()
            }),
            None => OffsetMap::new(),
        };

        let metrics = Arc::new(ShipperMetrics::new());
        let options = WatchOptions {
            format: config.format,
            max_line_size: config.max_line_size,
        };

        let set = WatchSet::open(
            &config.watch,
            options,
            Arc::clone(&metrics),
            |path, inode, size| initial_position(&config, &saved, path, inode, size),
        );
        if set.is_empty() {
            return Err(ShipperError::no_watch_targets(&config.watch));
        }

        let watch = Arc::new(Mutex::new(set));
        let mut rotation = RotationController::new(Arc::clone(&watch), config.watch.clone());
        if let Some(store) = &offsets {
            rotation = rotation.with_offsets(store.clone());
        }

        Ok(Self {
            config,
            watch,
            rotation,
            offsets,
            metrics,
            connector,
            backoff,
        })
    }

    pub fn metrics(&self) -> Arc<ShipperMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Tail until a `Shutdown` command arrives or the channel closes
    pub async fn run(
        self,
        mut control: mpsc::Receiver<ControlCommand>,
    ) -> Result<MetricsSnapshot, ShipperError> {
        let Self {
            config,
            watch,
            mut rotation,
            offsets,
            metrics,
            connector,
            backoff,
        } = self;

        let (producer, consumer) = queue::bounded(config.queue_capacity);
        let cancel = CancellationToken::new();
        let sender = Sender::new(connector, consumer, Arc::clone(&metrics), backoff, cancel.clone());
        let sender_task = tokio::spawn(sender.run());

        let tailer = Tailer::new(Arc::clone(&watch), config.batch_size);
        let mut backlog: VecDeque<String> = VecDeque::new();

        tracing::info!(
            files = watch.lock().len(),
            queue_capacity = config.queue_capacity,
            "shipper started"
        );

        loop {
            let command = if backlog.is_empty() {
                let lines = tailer.poll_async().await?;
                if !lines.is_empty() {
                    backlog.extend(lines);
                    continue;
                }

                tokio::select! {
                    command = control.recv() => command,
                    _ = tokio::time::sleep(config.idle_interval) => continue,
                }
            } else {
                tokio::select! {
                    biased;
                    command = control.recv() => command,
                    slot = producer.reserve() => {
                        let slot = slot.map_err(|QueueClosed| ShipperError::QueueClosed)?;
                        if let Some(line) = backlog.pop_front() {
                            slot.send(LogMessage::new(line));
                            metrics.record_enqueued();
                        }
                        continue;
                    }
                }
            };

            match command.unwrap_or(ControlCommand::Shutdown) {
                ControlCommand::Rotate => {
                    let (moved, final_lines) = tokio::task::spawn_blocking(move || {
                        let lines = rotation.rotate();
                        (rotation, lines)
                    })
                    .await?;
                    rotation = moved;
                    backlog.extend(final_lines);
                }
                ControlCommand::Reload(paths) => {
                    let (moved, flushed) = tokio::task::spawn_blocking(move || {
                        let lines = rotation.reload(paths);
                        (rotation, lines)
                    })
                    .await?;
                    rotation = moved;
                    backlog.extend(flushed);
                    save_offsets(offsets.as_ref(), &rotation);
                }
                ControlCommand::Shutdown => break,
            }
        }

        tracing::info!(backlog = backlog.len(), "shipper stopping, draining queue");

        let flushed = {
            let watch = Arc::clone(&watch);
            tokio::task::spawn_blocking(move || watch.lock().flush_pending()).await?
        };
        backlog.extend(flushed);

        let draining = drain(&producer, &mut backlog, &metrics);
        let drained = match config.drain_timeout {
            Some(limit) => match tokio::time::timeout(limit, draining).await {
                Ok(result) => result.is_ok(),
                Err(_) => {
                    tracing::warn!(
                        pending = producer.pending(),
                        timeout_ms = limit.as_millis() as u64,
                        "drain timeout expired, abandoning queued messages"
                    );
                    false
                }
            },
            None => draining.await.is_ok(),
        };

        cancel.cancel();
        drop(producer);
        sender_task.await?;

        if drained {
            save_offsets(offsets.as_ref(), &rotation);
        }

        watch.lock().close();

        let snapshot = metrics.snapshot();
        tracing::info!(
            lines_read = snapshot.lines_read,
            messages_enqueued = snapshot.messages_enqueued,
            messages_sent = snapshot.messages_sent,
            send_failures = snapshot.send_failures,
            connects = snapshot.connects,
            blocks_dropped = snapshot.blocks_dropped,
            truncations = snapshot.truncations,
            "shipper stopped"
        );

        Ok(snapshot)
    }
}

/// Enqueue the backlog, then wait until the sender has written everything
async fn drain(
    producer: &QueueProducer,
    backlog: &mut VecDeque<String>,
    metrics: &ShipperMetrics,
) -> Result<(), QueueClosed> {
    while let Some(line) = backlog.pop_front() {
        producer.put(LogMessage::new(line)).await?;
        metrics.record_enqueued();
    }
    producer.join().await
}

fn initial_position(
    config: &ShipperConfig,
    saved: &OffsetMap,
    path: &Path,
    inode: u64,
    size: u64,
) -> SeekTo {
    if inode != 0
        && let Some(entry) = saved.get(&inode)
        && entry.offset <= size
    {
        tracing::info!(path = %path.display(), offset = entry.offset, "resuming from saved offset");
        return SeekTo::Offset(entry.offset);
    }

    match config.start_position {
        StartPosition::End => SeekTo::End,
        StartPosition::Beginning => SeekTo::Offset(config.start_offset.min(size)),
    }
}

fn save_offsets(store: Option<&OffsetStore>, rotation: &RotationController) {
    if let Some(store) = store
        && let Err(e) = store.save(&rotation.positions())
    {
        tracing::warn!(error = %e, "failed to save offsets");
    }
}

#[cfg(test)]
#[path = "shipper_test.rs"]
mod shipper_test;
