//! Collector configuration

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Collector configuration
///
/// The collector listens on `[transport] host:port`.
///
/// # Example
///
/// ```toml
/// [collector]
/// database = "/var/lib/logbeat/logs.db"
/// access_table_prefix = "access_log_"
/// slow_table_prefix = "slow_log_"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Database file
    /// Default: "logbeat.db"
    pub database: PathBuf,

    /// Access-log partitions are named `<prefix><YYYYMM>`
    /// Default: "access_log_"
    pub access_table_prefix: String,

    /// Slow-query partitions are named `<prefix><YYYYMM>`
    /// Default: "slow_log_"
    pub slow_table_prefix: String,

    /// Longest accepted message; longer lines are dropped
    /// Default: 1048576 (1MB)
    pub max_message_size: usize,

    /// Time allowed for a client to send its handshake line
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("logbeat.db"),
            access_table_prefix: "access_log_".into(),
            slow_table_prefix: "slow_log_".into(),
            max_message_size: 1024 * 1024,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}
