//! Collector error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a received line did not become a record
#[derive(Debug, Error)]
pub enum ParseError {
    /// Not a JSON object
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON value is not an object
    #[error("expected a json object")]
    NotAnObject,

    /// Required key absent or of the wrong type
    #[error("missing or invalid field '{0}'")]
    MissingField(&'static str),

    /// No usable timestamp
    #[error("no usable timestamp: {0}")]
    Timestamp(String),
}

/// Store and partition failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error from the database engine
    #[error("database error: {0}")]
    Database(#[from] turso::Error),

    /// Table name would not be a plain identifier
    #[error("invalid table name '{0}'")]
    InvalidTable(String),

    /// Record time does not yield a YYYYMM key
    #[error("cannot derive partition from time '{0}'")]
    InvalidPartitionKey(String),

    /// Database directory could not be created
    #[error("cannot prepare database path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors that stop the ingest server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Startup store access failed
    #[error(transparent)]
    Store(#[from] StoreError),
}
