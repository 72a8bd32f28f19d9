//! Configuration validation
//!
//! Checks that run on every load:
//! - Transport has a usable port and a whitespace-free username
//!
//! Role checks run only when that role starts:
//! - `validate_shipper`: something to watch, non-zero queue and batch sizes
//! - `validate_collector`: table prefixes are safe to splice into DDL and do
//!   not collide

use crate::Config;
use crate::error::{ConfigError, Result};

/// Validate everything that does not depend on the role being started
pub fn validate_config(config: &Config) -> Result<()> {
    validate_transport(config)
}

/// Validate the shipper role: there must be something to tail
pub fn validate_shipper(config: &Config) -> Result<()> {
    if config.shipper.watch.is_empty() {
        return Err(ConfigError::NoWatchTargets);
    }
    validate_shipper_limits(config)
}

fn validate_transport(config: &Config) -> Result<()> {
    let transport = &config.transport;

    if transport.host.is_empty() {
        return Err(ConfigError::missing_field("transport", "host"));
    }
    if transport.port == 0 {
        return Err(ConfigError::invalid_value(
            "transport",
            "port",
            "must be non-zero",
        ));
    }
    if transport.username.is_empty() {
        return Err(ConfigError::missing_field("transport", "username"));
    }
    if transport.username.chars().any(char::is_whitespace) {
        return Err(ConfigError::invalid_value(
            "transport",
            "username",
            "must not contain whitespace",
        ));
    }
    if transport.max_reconnect_interval < transport.reconnect_interval {
        return Err(ConfigError::invalid_value(
            "transport",
            "max_reconnect_interval",
            "must be at least reconnect_interval",
        ));
    }

    Ok(())
}

fn validate_shipper_limits(config: &Config) -> Result<()> {
    let shipper = &config.shipper;

    if shipper.queue_capacity == 0 {
        return Err(ConfigError::invalid_value(
            "shipper",
            "queue_capacity",
            "must be greater than 0",
        ));
    }
    if shipper.batch_size == 0 {
        return Err(ConfigError::invalid_value(
            "shipper",
            "batch_size",
            "must be greater than 0",
        ));
    }
    if shipper.max_line_size == 0 {
        return Err(ConfigError::invalid_value(
            "shipper",
            "max_line_size",
            "must be greater than 0",
        ));
    }

    Ok(())
}

/// Validate the collector role
pub fn validate_collector(config: &Config) -> Result<()> {
    let collector = &config.collector;

    validate_prefix("access_table_prefix", &collector.access_table_prefix)?;
    validate_prefix("slow_table_prefix", &collector.slow_table_prefix)?;

    if collector.access_table_prefix == collector.slow_table_prefix {
        return Err(ConfigError::invalid_value(
            "collector",
            "slow_table_prefix",
            "must differ from access_table_prefix",
        ));
    }

    // A prefix that extends the other would let one kind's seeding pick up the other's tables
    if collector
        .access_table_prefix
        .starts_with(&collector.slow_table_prefix)
        || collector
            .slow_table_prefix
            .starts_with(&collector.access_table_prefix)
    {
        return Err(ConfigError::invalid_value(
            "collector",
            "slow_table_prefix",
            "table prefixes must not be prefixes of each other",
        ));
    }

    Ok(())
}

/// Prefixes end up in `CREATE TABLE` statements unquoted
fn validate_prefix(field: &'static str, prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(ConfigError::missing_field("collector", field));
    }
    if !prefix.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return Err(ConfigError::invalid_value(
            "collector",
            field,
            "must start with a letter or underscore",
        ));
    }
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::invalid_value(
            "collector",
            field,
            "may only contain [A-Za-z0-9_]",
        ));
    }
    Ok(())
}
