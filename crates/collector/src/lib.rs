//! Logbeat Collector
//!
//! Receives lines from shippers and stores them in month-partitioned tables.
//!
//! # Flow
//!
//! ```text
//! IngestServer -> LineParser -> PartitionRouter -> StoreWriter -> LogStore
//! ```
//!
//! - **Parsing**: slow-log envelopes and access-log JSON become fixed-shape
//!   records with normalised times. Unparseable lines are logged and dropped.
//! - **Partitioning**: tables are named `<prefix><YYYYMM>`. A table is
//!   created the first time its month is seen, once, even when several
//!   connections race for it.
//! - **Storage**: [`TursoStore`] is the default [`LogStore`].
//!
//! # Example
//!
//! ```ignore
//! use logbeat_collector::{IngestServer, TursoStore};
//!
//! let store = Arc::new(TursoStore::open(&config.collector.database).await?);
//! let server = IngestServer::new(&config.collector, &config.transport, store);
//! let snapshot = server.run(cancel).await?;
//! ```

mod error;
mod metrics;
mod parser;
mod partition;
mod record;
mod server;
mod store;

pub use error::{ParseError, ServerError, StoreError};
pub use metrics::{IngestMetrics, IngestSnapshot};
pub use parser::{LineParser, MAX_TEXT_BYTES};
pub use partition::{PartitionRouter, partition_key};
pub use record::{AccessLogRecord, ParsedRecord, RecordKind, SlowQueryRecord};
pub use server::IngestServer;
pub use store::{LogStore, StoreWriter, TursoStore};

/// Result type for collector operations
pub type Result<T> = std::result::Result<T, ServerError>;
