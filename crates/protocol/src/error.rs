//! Protocol error types

use thiserror::Error;

/// Errors raised while speaking the shipper/collector wire protocol
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Underlying socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Handshake line could not be understood
    #[error("malformed handshake: {0}")]
    MalformedHandshake(String),

    /// Peer speaks a different protocol revision
    #[error("unsupported protocol '{0}'")]
    UnsupportedProtocol(String),

    /// Collector rejected the credentials
    #[error("handshake denied: {0}")]
    Denied(String),

    /// Peer closed the connection mid-handshake
    #[error("connection closed during handshake")]
    Closed,

    /// Handshake did not complete in time
    #[error("handshake timed out")]
    Timeout,

    /// Line exceeded the configured maximum
    #[error("line exceeds {max} bytes")]
    LineTooLong { max: usize },
}

impl ProtocolError {
    /// Create a malformed handshake error
    #[inline]
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedHandshake(msg.into())
    }
}
