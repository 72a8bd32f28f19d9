//! Relational store seam
//!
//! [`LogStore`] is the whole surface the ingest path needs from a
//! database. It is small enough for tests to count partition creations
//! against an in-memory double.

mod turso_store;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::{ParsedRecord, RecordKind};

pub use turso_store::TursoStore;

#[async_trait]
pub trait LogStore: Send + Sync {
    /// Names of existing tables starting with `prefix`
    async fn existing_tables(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Create `table` for records of `kind` if it does not exist
    async fn create_partition(&self, kind: RecordKind, table: &str) -> Result<(), StoreError>;

    /// Insert one record into `table`
    async fn insert(&self, table: &str, record: &ParsedRecord) -> Result<(), StoreError>;
}

/// Performs the insert for a routed record
#[derive(Clone)]
pub struct StoreWriter {
    store: Arc<dyn LogStore>,
}

impl StoreWriter {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    /// Insert `record` into its partition table
    ///
    /// Failures are returned to the caller; nothing is retried here.
    pub async fn write(&self, record: &ParsedRecord, table: &str) -> Result<(), StoreError> {
        self.store.insert(table, record).await?;
        tracing::trace!(table, kind = record.kind().as_str(), "record written");
        Ok(())
    }
}

/// Whether `name` is safe to splice into DDL
pub(crate) fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;
