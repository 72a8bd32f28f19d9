//! Turso-backed store
//!
//! One table per month and kind. DDL is a fixed template with the table
//! name spliced in; the name is checked to be a plain identifier first
//! since it cannot be bound as a parameter.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};
use turso::{Builder, Database};

use super::{LogStore, is_plain_identifier};
use crate::error::StoreError;
use crate::record::{AccessLogRecord, ParsedRecord, RecordKind, SlowQueryRecord};

pub struct TursoStore {
    db: Database,
}

impl TursoStore {
    /// Open (or create) a database file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        info!(path = %path.display(), "opening log database");
        let db = Builder::new_local(&path.to_string_lossy()).build().await?;
        Ok(Self { db })
    }

    /// In-memory database (for testing)
    pub async fn memory() -> Result<Self, StoreError> {
        let db = Builder::new_local(":memory:").build().await?;
        Ok(Self { db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn insert_access(&self, table: &str, r: &AccessLogRecord) -> Result<(), StoreError> {
        let conn = self.db.connect()?;
        let sql = format!(
            "INSERT INTO {table} (time, host, client_ip, request_uri, request_query, \
             request_version, request_method, status, size, upstream_addr, upstream_status, \
             upstream_response_time, request_time, http_referer, user_agent, x_forwarded_for, \
             tag_hash) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        );

        conn.execute(
            &sql,
            [
                r.time.as_str(),
                r.host.as_str(),
                r.client_ip.as_str(),
                r.request_uri.as_str(),
                r.request_query.as_str(),
                r.request_version.as_str(),
                r.request_method.as_str(),
                r.status.as_str(),
                r.size.as_str(),
                r.upstream_addr.as_str(),
                r.upstream_status.as_str(),
                r.upstream_response_time.as_str(),
                r.request_time.as_str(),
                r.http_referer.as_str(),
                r.user_agent.as_str(),
                r.x_forwarded_for.as_str(),
                r.tag_hash.as_deref().unwrap_or(""),
            ],
        )
        .await?;

        Ok(())
    }

    async fn insert_slow(&self, table: &str, r: &SlowQueryRecord) -> Result<(), StoreError> {
        let conn = self.db.connect()?;
        let sql = format!(
            "INSERT INTO {table} (time, user, host, query_id, query_time, lock_time, \
             rows_sent, rows_examined, content) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        );

        let query_id = r.query_id.to_string();
        let query_time = r.query_time.to_string();
        let lock_time = r.lock_time.to_string();
        let rows_sent = r.rows_sent.to_string();
        let rows_examined = r.rows_examined.to_string();

        conn.execute(
            &sql,
            [
                r.time.as_str(),
                r.user.as_str(),
                r.host.as_str(),
                query_id.as_str(),
                query_time.as_str(),
                lock_time.as_str(),
                rows_sent.as_str(),
                rows_examined.as_str(),
                r.content.as_str(),
            ],
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LogStore for TursoStore {
    async fn existing_tables(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                (),
            )
            .await?;

        let mut tables = Vec::new();
        while let Some(row) = rows.next().await? {
            let value = row.get_value(0)?;
            if let Some(name) = value.as_text()
                && name.starts_with(prefix)
            {
                tables.push(name.clone());
            }
        }

        Ok(tables)
    }

    async fn create_partition(&self, kind: RecordKind, table: &str) -> Result<(), StoreError> {
        if !is_plain_identifier(table) {
            return Err(StoreError::InvalidTable(table.to_string()));
        }

        let template = match kind {
            RecordKind::Access => SCHEMA_ACCESS_LOG,
            RecordKind::Slow => SCHEMA_SLOW_LOG,
        };

        let conn = self.db.connect()?;
        conn.execute(&template.replace("{table}", table), ()).await?;
        conn.execute(&INDEX_TIME.replace("{table}", table), ())
            .await?;

        debug!(table, kind = kind.as_str(), "partition table ensured");
        Ok(())
    }

    async fn insert(&self, table: &str, record: &ParsedRecord) -> Result<(), StoreError> {
        if !is_plain_identifier(table) {
            return Err(StoreError::InvalidTable(table.to_string()));
        }

        match record {
            ParsedRecord::Access(r) => self.insert_access(table, r).await,
            ParsedRecord::Slow(r) => self.insert_slow(table, r).await,
        }
    }
}

// =============================================================================
// Schema Definitions
// =============================================================================

const SCHEMA_ACCESS_LOG: &str = r#"
CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY,
    time TEXT NOT NULL,
    host TEXT NOT NULL DEFAULT '',
    client_ip TEXT NOT NULL DEFAULT '',
    request_uri TEXT NOT NULL DEFAULT '',
    request_query TEXT NOT NULL DEFAULT '',
    request_version TEXT NOT NULL DEFAULT '',
    request_method TEXT NOT NULL DEFAULT '',
    status INTEGER NOT NULL DEFAULT 0,
    size INTEGER NOT NULL DEFAULT 0,
    upstream_addr TEXT NOT NULL DEFAULT '',
    upstream_status INTEGER NOT NULL DEFAULT 0,
    upstream_response_time REAL NOT NULL DEFAULT 0,
    request_time REAL NOT NULL DEFAULT 0,
    http_referer TEXT NOT NULL DEFAULT '',
    user_agent TEXT NOT NULL DEFAULT '',
    x_forwarded_for TEXT NOT NULL DEFAULT '',
    tag_hash TEXT NOT NULL DEFAULT ''
)
"#;

const SCHEMA_SLOW_LOG: &str = r#"
CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY,
    time TEXT NOT NULL,
    user TEXT NOT NULL DEFAULT '',
    host TEXT NOT NULL DEFAULT '',
    query_id INTEGER NOT NULL DEFAULT 0,
    query_time REAL NOT NULL DEFAULT 0,
    lock_time REAL NOT NULL DEFAULT 0,
    rows_sent INTEGER NOT NULL DEFAULT 0,
    rows_examined INTEGER NOT NULL DEFAULT 0,
    content TEXT NOT NULL DEFAULT ''
)
"#;

const INDEX_TIME: &str = "CREATE INDEX IF NOT EXISTS idx_{table}_time ON {table}(time)";
