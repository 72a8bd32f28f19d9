//! Ingest counters

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct IngestMetrics {
    /// Connections accepted
    pub connections_total: AtomicU64,

    /// Connections currently open
    pub connections_active: AtomicU64,

    /// Handshakes refused or broken
    pub auth_failures: AtomicU64,

    /// Lines read after a successful handshake
    pub messages_received: AtomicU64,

    /// Lines that did not parse (or were too long)
    pub parse_failures: AtomicU64,

    /// Rows inserted
    pub records_written: AtomicU64,

    /// Failed partition creations or inserts
    pub write_failures: AtomicU64,

    /// Partition tables created by this process
    pub partitions_created: AtomicU64,
}

impl IngestMetrics {
    pub const fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            partitions_created: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_written(&self) {
        self.records_written.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn partition_created(&self) {
        self.partitions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            partitions_created: self.partitions_created.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`IngestMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub auth_failures: u64,
    pub messages_received: u64,
    pub parse_failures: u64,
    pub records_written: u64,
    pub write_failures: u64,
    pub partitions_created: u64,
}
