//! Logbeat Protocol - what travels between shipper and collector
//!
//! - `framing` - newline-delimited messages with bounded reads
//! - `handshake` - per-connection credential exchange
//! - `slowlog` - the JSON envelope for reassembled MySQL slow-log blocks
//!
//! Access-log lines are forwarded verbatim; only slow-log blocks are
//! re-encoded by the shipper.

mod error;
mod framing;
mod handshake;
mod slowlog;

pub use error::ProtocolError;
pub use framing::{LineRead, is_connection_reset, read_bounded_line, write_line};
pub use handshake::{Credentials, Hello, PROTOCOL_TAG, Reply};
pub use slowlog::{
    SLOW_LOG_TYPE, SlowBlockError, SlowLogEnvelope, is_slow_log_message, parse_slow_block,
};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
