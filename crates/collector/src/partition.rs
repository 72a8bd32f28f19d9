//! Month partitions
//!
//! Each record goes to `<prefix><YYYYMM>`, the month taken from its
//! normalised time. Known tables live in a process-wide set that only
//! grows, behind a lock that is never held across a store call. The rare
//! creation path is serialized by a separate mutex and checks the set
//! again once inside, so concurrent first writes to a new month issue the
//! DDL once and all wait for it. Records for known tables never wait on
//! a creation in progress.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::error::StoreError;
use crate::metrics::IngestMetrics;
use crate::record::{ParsedRecord, RecordKind};
use crate::store::LogStore;

/// Derive `YYYYMM` from `YYYY-MM-...`
pub fn partition_key(time: &str) -> Result<String, StoreError> {
    let key: String = time
        .get(..7)
        .ok_or_else(|| StoreError::InvalidPartitionKey(time.to_string()))?
        .chars()
        .filter(|&c| c != '-')
        .collect();

    if key.len() != 6 || !key.chars().all(|c| c.is_ascii_digit()) {
        return Err(StoreError::InvalidPartitionKey(time.to_string()));
    }
    Ok(key)
}

pub struct PartitionRouter {
    store: Arc<dyn LogStore>,
    access_prefix: String,
    slow_prefix: String,
    known: RwLock<HashSet<String>>,
    creating: Mutex<()>,
    metrics: Arc<IngestMetrics>,
}

impl PartitionRouter {
    pub fn new(
        store: Arc<dyn LogStore>,
        access_prefix: impl Into<String>,
        slow_prefix: impl Into<String>,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            store,
            access_prefix: access_prefix.into(),
            slow_prefix: slow_prefix.into(),
            known: RwLock::new(HashSet::new()),
            creating: Mutex::new(()),
            metrics,
        }
    }

    fn prefix(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Access => &self.access_prefix,
            RecordKind::Slow => &self.slow_prefix,
        }
    }

    /// Load the tables that already exist
    ///
    /// Returns how many were found.
    pub async fn seed(&self) -> Result<usize, StoreError> {
        let mut found = Vec::new();
        for kind in [RecordKind::Access, RecordKind::Slow] {
            found.extend(self.store.existing_tables(self.prefix(kind)).await?);
        }

        let mut known = self.known.write().await;
        let before = known.len();
        known.extend(found);
        let added = known.len() - before;

        tracing::info!(partitions = known.len(), "partition cache seeded");
        Ok(added)
    }

    /// Table name for `record`
    pub fn table_for(&self, record: &ParsedRecord) -> Result<String, StoreError> {
        let key = partition_key(record.time())?;
        Ok(format!("{}{}", self.prefix(record.kind()), key))
    }

    /// Route `record` and make sure its table exists
    ///
    /// A failed creation is not cached; the next record for that month
    /// tries again.
    pub async fn route_and_ensure(&self, record: &ParsedRecord) -> Result<String, StoreError> {
        let table = self.table_for(record)?;

        if self.is_known(&table).await {
            return Ok(table);
        }

        let _creating = self.creating.lock().await;

        // Another connection may have created it while we waited
        if self.is_known(&table).await {
            return Ok(table);
        }

        self.store.create_partition(record.kind(), &table).await?;
        self.known.write().await.insert(table.clone());
        self.metrics.partition_created();

        tracing::info!(table = %table, kind = record.kind().as_str(), "partition created");
        Ok(table)
    }

    pub async fn is_known(&self, table: &str) -> bool {
        self.known.read().await.contains(table)
    }

    pub async fn known_count(&self) -> usize {
        self.known.read().await.len()
    }
}

#[cfg(test)]
#[path = "partition_test.rs"]
mod partition_test;
