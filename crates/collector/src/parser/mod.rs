//! Line parsing
//!
//! A received line is either a slow-log envelope (recognised by its
//! literal `{"type":"mysql_slow_log"` prefix) or an access-log JSON
//! object. A line that fails to parse is logged and skipped; it never
//! reaches the store and never closes the connection.

mod access;
mod slow;

use chrono::{DateTime, FixedOffset, Local, Utc};
use logbeat_protocol::is_slow_log_message;

use crate::error::ParseError;
use crate::record::ParsedRecord;

/// Stored time format
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Longest stored URI, query, referer, user agent and forwarded-for
pub const MAX_TEXT_BYTES: usize = 191;

#[derive(Debug, Clone, Default)]
pub struct LineParser {
    /// `None` renders times in the host's local zone
    offset: Option<FixedOffset>,
}

impl LineParser {
    /// Parser rendering times in the local zone
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser rendering times at a fixed UTC offset
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self {
            offset: Some(offset),
        }
    }

    /// Parse a line, logging and discarding failures
    pub fn parse(&self, line: &str) -> Option<ParsedRecord> {
        match self.parse_line(line, Utc::now()) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, line = %preview(line), "unparseable log line");
                None
            }
        }
    }

    /// Parse a line; `received_at` stands in for a missing slow-log timestamp
    pub fn parse_line(
        &self,
        line: &str,
        received_at: DateTime<Utc>,
    ) -> Result<ParsedRecord, ParseError> {
        if is_slow_log_message(line) {
            slow::parse(self, line, received_at).map(ParsedRecord::Slow)
        } else {
            access::parse(self, line).map(ParsedRecord::Access)
        }
    }

    fn render(&self, at: DateTime<Utc>) -> String {
        match self.offset {
            Some(offset) => at.with_timezone(&offset).format(TIME_FORMAT).to_string(),
            None => at.with_timezone(&Local).format(TIME_FORMAT).to_string(),
        }
    }

    /// Render fractional epoch seconds
    fn render_epoch(&self, seconds: f64) -> Option<String> {
        if !seconds.is_finite() || seconds < 0.0 {
            return None;
        }
        let millis = (seconds * 1000.0).round() as i64;
        DateTime::from_timestamp_millis(millis).map(|at| self.render(at))
    }
}

/// Cut `s` to at most `max` bytes without splitting a character
pub(crate) fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn preview(line: &str) -> &str {
    truncate_bytes(line, 200)
}
