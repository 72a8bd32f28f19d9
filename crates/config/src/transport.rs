//! Transport configuration
//!
//! Shared by both roles: the shipper dials `host:port`, the collector binds it.
//! Credentials are checked once per connection during the handshake.

use serde::Deserialize;
use std::time::Duration;

/// Connection settings between shipper and collector
///
/// # Example
///
/// ```toml
/// [transport]
/// host = "logs.internal"
/// port = 8765
/// username = "edge-01"
/// password = "s3cret"
/// reconnect_interval = "1s"
/// max_reconnect_interval = "30s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Collector host (shipper) or bind address (collector)
    /// Default: "127.0.0.1"
    pub host: String,

    /// Collector port
    /// Default: 8765
    pub port: u16,

    /// Handshake username (no whitespace)
    /// Default: "logbeat"
    pub username: String,

    /// Handshake password
    /// Default: "" (empty)
    pub password: String,

    /// TCP connect timeout
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Timeout for a single message write
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,

    /// First reconnect backoff step, doubled per consecutive failure
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub reconnect_interval: Duration,

    /// Backoff ceiling
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub max_reconnect_interval: Duration,

    /// Enable TCP keep-alive probes
    /// Default: true
    pub tcp_keepalive: bool,

    /// Keep-alive idle time before probing
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub tcp_keepalive_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8765,
            username: "logbeat".into(),
            password: String::new(),
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_interval: Duration::from_secs(30),
            tcp_keepalive: true,
            tcp_keepalive_interval: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// `host:port` string used for both dialing and binding
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
