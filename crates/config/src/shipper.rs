//! Shipper configuration
//!
//! Which files to tail, how they are framed, and how much may be buffered
//! while the collector is unreachable.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// How lines read from watched files are turned into messages
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WatchFormat {
    /// One message per line (access logs already encoded as JSON)
    #[default]
    Plain,
    /// MySQL slow query log, reassembled into one JSON envelope per block
    MysqlSlow,
}

/// Where a freshly started shipper begins reading each file
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StartPosition {
    /// Seek to end of file, only new lines are shipped (default)
    #[default]
    End,
    /// Start at `start_offset` (0 = whole file)
    Beginning,
}

/// Shipper configuration
///
/// # Example
///
/// ```toml
/// [shipper]
/// watch = ["/var/log/nginx/access.json.log"]
/// queue_capacity = 10000
/// batch_size = 20
/// idle_interval = "1s"
/// offsets_file = "/var/lib/logbeat/offsets.json"
/// drain_timeout = "30s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    /// Files to tail
    /// Default: [] (must be set to ship)
    pub watch: Vec<PathBuf>,

    /// Line framing
    /// Default: plain
    pub format: WatchFormat,

    /// Delivery queue capacity (messages)
    /// Default: 10000
    pub queue_capacity: usize,

    /// Maximum messages produced by one tail poll
    /// Default: 20
    pub batch_size: usize,

    /// Sleep after a poll that found nothing new
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub idle_interval: Duration,

    /// Default: end
    pub start_position: StartPosition,

    /// Byte offset used with `start_position = "beginning"`
    /// Default: 0
    pub start_offset: u64,

    /// Persist inode offsets here so restarts resume where they stopped
    /// Default: None (offsets live in memory only)
    pub offsets_file: Option<PathBuf>,

    /// Upper bound on waiting for the queue to drain at shutdown
    /// Default: None (wait until drained)
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Option<Duration>,

    /// Lines longer than this are truncated
    /// Default: 1048576 (1MB)
    pub max_line_size: usize,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            watch: Vec::new(),
            format: WatchFormat::Plain,
            queue_capacity: 10_000,
            batch_size: 20,
            idle_interval: Duration::from_secs(1),
            start_position: StartPosition::End,
            start_offset: 0,
            offsets_file: None,
            drain_timeout: None,
            max_line_size: 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty() {
        let config: ShipperConfig = toml::from_str("").unwrap();
        assert!(config.watch.is_empty());
        assert_eq!(config.format, WatchFormat::Plain);
        assert_eq!(config.queue_capacity, 10_000);
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.idle_interval, Duration::from_secs(1));
        assert_eq!(config.start_position, StartPosition::End);
        assert!(config.offsets_file.is_none());
        assert!(config.drain_timeout.is_none());
    }

    #[test]
    fn test_deserialize_slow_log() {
        let toml = r#"
watch = ["/var/lib/mysql/slow.log"]
format = "mysql_slow"
start_position = "beginning"
start_offset = 4096
drain_timeout = "15s"
offsets_file = "/tmp/offsets.json"
"#;
        let config: ShipperConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.watch, vec![PathBuf::from("/var/lib/mysql/slow.log")]);
        assert_eq!(config.format, WatchFormat::MysqlSlow);
        assert_eq!(config.start_position, StartPosition::Beginning);
        assert_eq!(config.start_offset, 4096);
        assert_eq!(config.drain_timeout, Some(Duration::from_secs(15)));
        assert_eq!(config.offsets_file, Some(PathBuf::from("/tmp/offsets.json")));
    }
}
