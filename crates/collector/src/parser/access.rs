//! Access-log JSON lines
//!
//! ```json
//! {"@timestamp":"2024-03-05T10:00:51+08:00","msec":1709604051.123,
//!  "http_host":"shop.example","clientip":"10.0.0.8",
//!  "request":"POST /cart?id=324 HTTP/1.1","status":"200","size":"44",
//!  "upstream_addr":"127.0.0.1:9000","upstream_status":"200",
//!  "upstream_response_time":"0.041","request_time":"0.041",
//!  "http_referer":"","http_user_agent":"curl/8.5","http_x_forwarded_for":"",
//!  "tag":"session-abc"}
//! ```

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::{LineParser, MAX_TEXT_BYTES, truncate_bytes};
use crate::error::ParseError;
use crate::record::AccessLogRecord;

type Object = Map<String, Value>;

pub(super) fn parse(parser: &LineParser, line: &str) -> Result<AccessLogRecord, ParseError> {
    let value: Value = serde_json::from_str(line)?;
    let Value::Object(obj) = value else {
        return Err(ParseError::NotAnObject);
    };

    let time = access_time(parser, &obj)?;
    let request = text(&obj, "request")?;
    let request = split_request(&request);

    Ok(AccessLogRecord {
        time,
        host: text(&obj, "http_host")?,
        client_ip: text(&obj, "clientip")?,
        request_uri: truncate_bytes(request.uri, MAX_TEXT_BYTES).to_string(),
        request_query: truncate_bytes(request.query, MAX_TEXT_BYTES).to_string(),
        request_version: request.version.to_string(),
        request_method: request.method.to_string(),
        status: dash_to_zero(text(&obj, "status")?),
        size: dash_to_zero(text(&obj, "size")?),
        upstream_addr: text(&obj, "upstream_addr")?,
        upstream_status: upstream_sentinel(text(&obj, "upstream_status")?),
        upstream_response_time: upstream_sentinel(text(&obj, "upstream_response_time")?),
        request_time: dash_to_zero(text(&obj, "request_time")?),
        http_referer: truncated(&obj, "http_referer")?,
        user_agent: truncated(&obj, "http_user_agent")?,
        x_forwarded_for: truncated(&obj, "http_x_forwarded_for")?,
        tag_hash: obj
            .get("tag")
            .and_then(Value::as_str)
            .filter(|tag| !tag.is_empty())
            .map(|tag| hex::encode(Sha256::digest(tag.as_bytes()))),
    })
}

/// Parts of `"METHOD URI[?QUERY] PROTO/VERSION"`; missing parts are empty
#[derive(Debug, PartialEq, Eq)]
pub(super) struct RequestLine<'a> {
    pub method: &'a str,
    pub uri: &'a str,
    pub query: &'a str,
    pub version: &'a str,
}

pub(super) fn split_request(request: &str) -> RequestLine<'_> {
    let mut parts = request.split(' ');
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("");
    let protocol = parts.next().unwrap_or("");

    let (uri, query) = target.split_once('?').unwrap_or((target, ""));
    let version = protocol.split_once('/').map(|(_, v)| v).unwrap_or("");

    RequestLine {
        method,
        uri,
        query,
        version,
    }
}

/// Epoch `msec`/`timestamp` first, then `@timestamp`
fn access_time(parser: &LineParser, obj: &Object) -> Result<String, ParseError> {
    for key in ["msec", "timestamp"] {
        if let Some(seconds) = obj.get(key).and_then(epoch_seconds)
            && let Some(rendered) = parser.render_epoch(seconds)
        {
            return Ok(rendered);
        }
    }

    let stamp = obj
        .get("@timestamp")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingField("@timestamp"))?;

    if let Ok(at) = DateTime::parse_from_rfc3339(stamp) {
        return Ok(parser.render(at.with_timezone(&Utc)));
    }

    // Keep the wall-clock part of anything ISO-like
    match stamp.get(..19) {
        Some(head) => Ok(format!("{}.000", head.replacen('T', " ", 1))),
        None => Err(ParseError::Timestamp(stamp.to_string())),
    }
}

fn epoch_seconds(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A string field, or a number rendered as text
fn text(obj: &Object, key: &'static str) -> Result<String, ParseError> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ParseError::MissingField(key)),
    }
}

fn truncated(obj: &Object, key: &'static str) -> Result<String, ParseError> {
    text(obj, key).map(|s| truncate_bytes(&s, MAX_TEXT_BYTES).to_string())
}

/// `-` becomes `0`, also per element of multi-upstream values like `502, -`
fn dash_to_zero(value: String) -> String {
    if !value.contains('-') {
        return value;
    }
    value
        .split(' ')
        .map(|part| match part.strip_suffix(',') {
            Some("-") => "0,",
            _ if part == "-" => "0",
            _ => part,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// nginx writes `-` when no upstream was contacted, empty when unset
fn upstream_sentinel(value: String) -> String {
    if value.is_empty() {
        "0".to_string()
    } else {
        dash_to_zero(value)
    }
}
