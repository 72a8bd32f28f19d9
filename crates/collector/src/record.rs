//! Parsed records, one fixed shape per log kind

/// Which partition family a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Access,
    Slow,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Slow => "slow",
        }
    }
}

/// One nginx-style access log line
///
/// Numeric columns are kept as the text that arrived (after sentinel
/// substitution); the store's column affinity converts them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogRecord {
    /// Local time, `YYYY-MM-DD HH:MM:SS.mmm`
    pub time: String,
    pub host: String,
    pub client_ip: String,
    pub request_uri: String,
    pub request_query: String,
    pub request_version: String,
    pub request_method: String,
    pub status: String,
    pub size: String,
    pub upstream_addr: String,
    pub upstream_status: String,
    pub upstream_response_time: String,
    pub request_time: String,
    pub http_referer: String,
    pub user_agent: String,
    pub x_forwarded_for: String,
    /// SHA-256 hex of the session tag, if one was sent
    pub tag_hash: Option<String>,
}

/// One MySQL slow query
#[derive(Debug, Clone, PartialEq)]
pub struct SlowQueryRecord {
    /// Local time, `YYYY-MM-DD HH:MM:SS.mmm`
    pub time: String,
    pub user: String,
    pub host: String,
    pub query_id: u64,
    pub query_time: f64,
    pub lock_time: f64,
    pub rows_sent: u64,
    pub rows_examined: u64,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRecord {
    Access(AccessLogRecord),
    Slow(SlowQueryRecord),
}

impl ParsedRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Access(_) => RecordKind::Access,
            Self::Slow(_) => RecordKind::Slow,
        }
    }

    pub fn time(&self) -> &str {
        match self {
            Self::Access(r) => &r.time,
            Self::Slow(r) => &r.time,
        }
    }
}
