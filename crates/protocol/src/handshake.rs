//! Connection handshake
//!
//! The first line a shipper sends on a fresh connection identifies it:
//!
//! ```text
//! LOGBEAT/1 <username> <sha256-hex(password)>
//! ```
//!
//! The collector replies `OK` or `DENIED <reason>` and closes on denial.
//! Only after `OK` does the shipper start sending log lines.

use sha2::{Digest, Sha256};

use crate::error::ProtocolError;

/// Protocol tag leading every hello line
pub const PROTOCOL_TAG: &str = "LOGBEAT/1";

const REPLY_OK: &str = "OK";
const REPLY_DENIED: &str = "DENIED";

/// Username/password pair configured on both ends
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Hex SHA-256 of the password, as carried in the hello line
    pub fn password_digest(&self) -> String {
        hex::encode(Sha256::digest(self.password.as_bytes()))
    }

    /// Build the hello line (without trailing newline)
    pub fn hello_line(&self) -> String {
        format!(
            "{} {} {}",
            PROTOCOL_TAG,
            self.username,
            self.password_digest()
        )
    }

    /// Check a received hello against these credentials
    pub fn accepts(&self, hello: &Hello) -> bool {
        hello.username == self.username
            && constant_time_eq(
                hello.password_digest.as_bytes(),
                self.password_digest().as_bytes(),
            )
    }
}

/// Parsed client hello
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub username: String,
    pub password_digest: String,
}

impl Hello {
    /// Parse a hello line
    ///
    /// # Errors
    ///
    /// `UnsupportedProtocol` when the tag differs, `MalformedHandshake` when
    /// fields are missing or the digest is not 64 hex characters.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut parts = line.split_ascii_whitespace();

        let tag = parts
            .next()
            .ok_or_else(|| ProtocolError::malformed("empty hello"))?;
        if tag != PROTOCOL_TAG {
            return Err(ProtocolError::UnsupportedProtocol(tag.to_string()));
        }

        let username = parts
            .next()
            .ok_or_else(|| ProtocolError::malformed("missing username"))?;
        let digest = parts
            .next()
            .ok_or_else(|| ProtocolError::malformed("missing password digest"))?;

        if parts.next().is_some() {
            return Err(ProtocolError::malformed("trailing fields"));
        }
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ProtocolError::malformed("password digest is not sha256 hex"));
        }

        Ok(Self {
            username: username.to_string(),
            password_digest: digest.to_ascii_lowercase(),
        })
    }
}

/// Collector's answer to a hello
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Denied(String),
}

impl Reply {
    /// Encode as a line (without trailing newline)
    pub fn to_line(&self) -> String {
        match self {
            Self::Ok => REPLY_OK.to_string(),
            Self::Denied(reason) => format!("{REPLY_DENIED} {reason}"),
        }
    }

    /// Parse a reply line
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        if line == REPLY_OK {
            return Ok(Self::Ok);
        }
        if let Some(rest) = line.strip_prefix(REPLY_DENIED) {
            return Ok(Self::Denied(rest.trim().to_string()));
        }
        Err(ProtocolError::malformed(format!("unexpected reply '{line}'")))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
#[path = "handshake_test.rs"]
mod handshake_test;
