//! Slow-log envelopes produced by the shipper's block assembler

use chrono::{DateTime, Utc};
use logbeat_protocol::{SLOW_LOG_TYPE, SlowLogEnvelope};

use super::LineParser;
use crate::error::ParseError;
use crate::record::SlowQueryRecord;

pub(super) fn parse(
    parser: &LineParser,
    line: &str,
    received_at: DateTime<Utc>,
) -> Result<SlowQueryRecord, ParseError> {
    let envelope: SlowLogEnvelope = serde_json::from_str(line)?;
    if envelope.kind != SLOW_LOG_TYPE {
        return Err(ParseError::MissingField("type"));
    }

    let time = envelope
        .timestamp
        .filter(|&ts| ts > 0)
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .unwrap_or(received_at);

    Ok(SlowQueryRecord {
        time: parser.render(time),
        user: envelope.user,
        host: envelope.host,
        query_id: envelope.query_id,
        query_time: envelope.query_time,
        lock_time: envelope.lock_time,
        rows_sent: envelope.rows_sent,
        rows_examined: envelope.rows_examined,
        content: envelope.content,
    })
}
