//! MySQL slow query log envelope
//!
//! A raw slow-log block spans several lines:
//!
//! ```text
//! # User@Host: app[app] @  [10.0.0.12]  Id: 514412
//! # Query_time: 3.265353  Lock_time: 0.000033 Rows_sent: 0  Rows_examined: 1052915
//! use shop;
//! SET timestamp=1660031855;
//! select * from `users` where `state` = 0 order by `id` desc limit 1;
//! ```
//!
//! The shipper folds each block into one JSON line so it travels like any
//! other message; the collector recognises it by its literal prefix.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Value of the envelope's `type` field
pub const SLOW_LOG_TYPE: &str = "mysql_slow_log";

/// Literal openings that mark a slow-log envelope (compact and spaced JSON)
const SLOW_LOG_PREFIXES: [&str; 2] = [
    r#"{"type":"mysql_slow_log""#,
    r#"{"type": "mysql_slow_log""#,
];

static USER_HOST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^# User@Host: ([\w.\-]+)\[[^\]]*\]\s*@\s*([\w.\-]*)\s*\[(.*?)\]\s*Id:\s*(\d+)$")
        .unwrap()
});

static QUERY_STATS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^# Query_time: ([0-9.]+)\s*Lock_time: ([0-9.]+)\s*Rows_sent: ([0-9]+)\s*Rows_examined: ([0-9]+)$",
    )
    .unwrap()
});

static SET_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^SET timestamp=([0-9]+);$").unwrap());

/// Whether a wire message is a slow-log envelope rather than an access log
pub fn is_slow_log_message(message: &str) -> bool {
    let message = message.trim_start();
    SLOW_LOG_PREFIXES.iter().any(|p| message.starts_with(p))
}

/// One slow query, as carried on the wire
///
/// Numeric fields are written as JSON numbers but read leniently: older
/// shippers sent them as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowLogEnvelope {
    /// Always [`SLOW_LOG_TYPE`]; kept first so the prefix check works
    #[serde(rename = "type")]
    pub kind: String,
    pub user: String,
    pub host: String,
    #[serde(deserialize_with = "lenient::u64")]
    pub query_id: u64,
    #[serde(deserialize_with = "lenient::f64")]
    pub query_time: f64,
    #[serde(deserialize_with = "lenient::f64")]
    pub lock_time: f64,
    #[serde(deserialize_with = "lenient::u64")]
    pub rows_sent: u64,
    #[serde(deserialize_with = "lenient::u64")]
    pub rows_examined: u64,
    /// Epoch seconds from `SET timestamp=`; absent in some blocks
    #[serde(
        default,
        deserialize_with = "lenient::opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,
    /// Statement text, lines joined with `\n`
    #[serde(default)]
    pub content: String,
}

impl SlowLogEnvelope {
    /// Serialize to a single wire line
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Why a raw block could not become an envelope
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SlowBlockError {
    #[error("block has {0} lines, need at least 2")]
    TooShort(usize),

    #[error("unrecognised User@Host header: {0}")]
    UserHost(String),

    #[error("unrecognised Query_time header: {0}")]
    QueryStats(String),
}

/// Turn one raw slow-log block into an envelope
///
/// Line 0 must be the `User@Host` header and line 1 the `Query_time`
/// header. `SET timestamp=N;` is looked for on line 2, then line 3, and
/// removed from the statement text when found.
pub fn parse_slow_block<S: AsRef<str>>(lines: &[S]) -> Result<SlowLogEnvelope, SlowBlockError> {
    if lines.len() < 2 {
        return Err(SlowBlockError::TooShort(lines.len()));
    }

    let header = lines[0].as_ref().trim_end();
    let caps = USER_HOST
        .captures(header)
        .ok_or_else(|| SlowBlockError::UserHost(header.to_string()))?;
    let user = caps[1].to_string();
    let host = if caps[2].is_empty() {
        caps[3].to_string()
    } else {
        caps[2].to_string()
    };
    let query_id = caps[4]
        .parse()
        .map_err(|_| SlowBlockError::UserHost(header.to_string()))?;

    let stats = lines[1].as_ref().trim_end();
    let caps = QUERY_STATS
        .captures(stats)
        .ok_or_else(|| SlowBlockError::QueryStats(stats.to_string()))?;
    let bad_stats = || SlowBlockError::QueryStats(stats.to_string());
    let query_time = caps[1].parse().map_err(|_| bad_stats())?;
    let lock_time = caps[2].parse().map_err(|_| bad_stats())?;
    let rows_sent = caps[3].parse().map_err(|_| bad_stats())?;
    let rows_examined = caps[4].parse().map_err(|_| bad_stats())?;

    let mut body: Vec<&str> = lines[2..].iter().map(|l| l.as_ref().trim_end()).collect();
    let mut timestamp = None;
    for idx in 0..body.len().min(2) {
        if let Some(caps) = SET_TIMESTAMP.captures(body[idx]) {
            timestamp = caps[1].parse().ok();
            body.remove(idx);
            break;
        }
    }

    Ok(SlowLogEnvelope {
        kind: SLOW_LOG_TYPE.to_string(),
        user,
        host,
        query_id,
        query_time,
        lock_time,
        rows_sent,
        rows_examined,
        timestamp,
        content: body.join("\n"),
    })
}

/// Deserializers that accept a number or a numeric string
mod lenient {
    use serde::Deserialize;
    use serde::de::{self, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrText {
        Num(serde_json::Number),
        Text(String),
    }

    pub fn u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        match NumOrText::deserialize(d)? {
            NumOrText::Num(n) => n
                .as_u64()
                .ok_or_else(|| de::Error::custom(format!("expected unsigned integer, got {n}"))),
            NumOrText::Text(s) => s.trim().parse().map_err(de::Error::custom),
        }
    }

    pub fn f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match NumOrText::deserialize(d)? {
            NumOrText::Num(n) => n
                .as_f64()
                .ok_or_else(|| de::Error::custom(format!("expected number, got {n}"))),
            NumOrText::Text(s) => s.trim().parse().map_err(de::Error::custom),
        }
    }

    pub fn opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        match Option::<NumOrText>::deserialize(d)? {
            None => Ok(None),
            Some(NumOrText::Num(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("expected integer, got {n}"))),
            Some(NumOrText::Text(s)) if s.trim().is_empty() => Ok(None),
            Some(NumOrText::Text(s)) => s.trim().parse().map(Some).map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
#[path = "slowlog_test.rs"]
mod slowlog_test;
