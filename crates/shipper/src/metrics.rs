//! Shipper counters
//!
//! Lock-free counters shared by the tail loop and the sender task.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ShipperMetrics {
    /// Lines read from watched files
    pub lines_read: AtomicU64,

    /// Messages handed to the delivery queue
    pub messages_enqueued: AtomicU64,

    /// Messages written to the collector connection
    pub messages_sent: AtomicU64,

    /// Failed writes (message kept and retried)
    pub send_failures: AtomicU64,

    /// Successful connects, including the first
    pub connects: AtomicU64,

    /// Slow-log blocks that failed to parse
    pub blocks_dropped: AtomicU64,

    /// Files found shorter than their read offset
    pub truncations: AtomicU64,
}

impl ShipperMetrics {
    pub const fn new() -> Self {
        Self {
            lines_read: AtomicU64::new(0),
            messages_enqueued: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            blocks_dropped: AtomicU64::new(0),
            truncations: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_lines(&self, count: u64) {
        self.lines_read.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_enqueued(&self) {
        self.messages_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_block_dropped(&self) {
        self.blocks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_truncation(&self) {
        self.truncations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            messages_enqueued: self.messages_enqueued.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            blocks_dropped: self.blocks_dropped.load(Ordering::Relaxed),
            truncations: self.truncations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ShipperMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub lines_read: u64,
    pub messages_enqueued: u64,
    pub messages_sent: u64,
    pub send_failures: u64,
    pub connects: u64,
    pub blocks_dropped: u64,
    pub truncations: u64,
}
