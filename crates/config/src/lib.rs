//! Logbeat Configuration
//!
//! TOML-based configuration shared by the shipper and the collector.
//! Every section has defaults, so a config only needs what differs.
//!
//! # Parsing
//!
//! ```
//! use logbeat_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[shipper]\nwatch = [\"/var/log/app.log\"]").unwrap();
//! assert_eq!(config.shipper.batch_size, 20);
//! ```
//!
//! # Example Shipper Config
//!
//! ```toml
//! [transport]
//! host = "logs.internal"
//! username = "edge-01"
//! password = "s3cret"
//!
//! [shipper]
//! watch = ["/var/log/nginx/access.json.log"]
//! ```
//!
//! # Example Collector Config
//!
//! ```toml
//! [transport]
//! host = "0.0.0.0"
//! username = "edge-01"
//! password = "s3cret"
//!
//! [collector]
//! database = "/var/lib/logbeat/logs.db"
//! ```

mod collector;
mod error;
mod logging;
mod shipper;
mod transport;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use collector::CollectorConfig;
pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use shipper::{ShipperConfig, StartPosition, WatchFormat};
pub use transport::TransportConfig;

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Diagnostic logging
    pub log: LogConfig,

    /// Shipper/collector connection and credentials
    pub transport: TransportConfig,

    /// Shipper role settings
    pub shipper: ShipperConfig,

    /// Collector role settings
    pub collector: CollectorConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, contains invalid TOML,
    /// or fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Checks that only matter when running as a shipper
    pub fn validate_shipper(&self) -> Result<()> {
        validation::validate_shipper(self)
    }

    /// Checks that only matter when running as a collector
    pub fn validate_collector(&self) -> Result<()> {
        validation::validate_collector(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
