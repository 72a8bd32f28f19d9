//! Bounded delivery queue between tail loop and sender
//!
//! A tokio bounded channel gives ordering and backpressure: `put` waits
//! while the queue is full. On top of it a pending counter tracks messages
//! that were enqueued but not yet marked done by the consumer, so shutdown
//! can `join` until everything buffered has been handed to the transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::{Notify, mpsc};

/// One line (or slow-log envelope) waiting for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub payload: String,
    pub enqueued_at: Instant,
}

impl LogMessage {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            enqueued_at: Instant::now(),
        }
    }
}

/// The consumer side is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("delivery queue closed")]
pub struct QueueClosed;

struct Shared {
    /// Enqueued and not yet `task_done`
    pending: AtomicUsize,
    drained: Notify,
    consumer_gone: AtomicBool,
    capacity: usize,
}

/// Create a queue holding at most `capacity` messages
pub fn bounded(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = mpsc::channel(capacity);
    let shared = Arc::new(Shared {
        pending: AtomicUsize::new(0),
        drained: Notify::new(),
        consumer_gone: AtomicBool::new(false),
        capacity,
    });

    (
        QueueProducer {
            tx,
            shared: Arc::clone(&shared),
        },
        QueueConsumer { rx, shared },
    )
}

#[derive(Clone)]
pub struct QueueProducer {
    tx: mpsc::Sender<LogMessage>,
    shared: Arc<Shared>,
}

impl QueueProducer {
    /// Enqueue, waiting while the queue is full
    pub async fn put(&self, message: LogMessage) -> Result<(), QueueClosed> {
        let slot = self.reserve().await?;
        slot.send(message);
        Ok(())
    }

    /// Wait for a free slot without giving up a message yet
    ///
    /// Cancel-safe: dropping the future loses nothing.
    pub async fn reserve(&self) -> Result<QueueSlot<'_>, QueueClosed> {
        let permit = self.tx.reserve().await.map_err(|_| QueueClosed)?;
        Ok(QueueSlot {
            permit,
            shared: &self.shared,
        })
    }

    /// Wait until every enqueued message has been marked done
    ///
    /// Fails if the consumer is dropped while messages are still pending.
    pub async fn join(&self) -> Result<(), QueueClosed> {
        loop {
            let drained = self.shared.drained.notified();
            tokio::pin!(drained);
            // Register before checking so a wakeup between the two is not missed
            drained.as_mut().enable();

            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return Ok(());
            }
            if self.shared.consumer_gone.load(Ordering::Acquire) {
                return Err(QueueClosed);
            }
            drained.await;
        }
    }

    /// Messages enqueued but not yet done
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

/// A reserved place in the queue
pub struct QueueSlot<'a> {
    permit: mpsc::Permit<'a, LogMessage>,
    shared: &'a Shared,
}

impl QueueSlot<'_> {
    pub fn send(self, message: LogMessage) {
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.permit.send(message);
    }
}

pub struct QueueConsumer {
    rx: mpsc::Receiver<LogMessage>,
    shared: Arc<Shared>,
}

impl QueueConsumer {
    /// Next message, waiting while empty; `None` once all producers are gone
    ///
    /// Cancel-safe.
    pub async fn get(&mut self) -> Option<LogMessage> {
        self.rx.recv().await
    }

    /// Mark one received message as delivered
    pub fn task_done(&self) {
        let previous = self.shared.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "task_done called more often than put");
        if previous == 1 {
            self.shared.drained.notify_waiters();
        }
    }
}

impl Drop for QueueConsumer {
    fn drop(&mut self) {
        // Nothing will ever drain what is left
        self.shared.consumer_gone.store(true, Ordering::Release);
        self.shared.drained.notify_waiters();
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;
