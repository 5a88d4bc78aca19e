//! Error types for the extraction engine

use dbsalvage_core::SalvageError;
use std::path::PathBuf;
use thiserror::Error;

/// A single statement failed
#[derive(Debug, Error)]
#[error("{source} (sql: {sql})")]
pub struct QueryError {
    /// The statement text that failed
    pub sql: String,
    /// The driver error
    #[source]
    pub source: SalvageError,
}

impl QueryError {
    pub fn new(sql: impl Into<String>, source: SalvageError) -> Self {
        Self {
            sql: sql.into(),
            source,
        }
    }

    /// Whether the driver reported a transport-level failure
    pub fn is_connection_level(&self) -> bool {
        self.source.is_connection_level()
    }
}

/// Errors raised by the extraction engine
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No connection could be opened within the attempt budget. Fatal for the run.
    #[error("Connection exhausted after {attempts} attempts: {last_error}")]
    ConnectionExhausted { attempts: u32, last_error: String },

    /// A query failed. Recoverable: triggers reconnection and column quarantine.
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// A table could not be exported even after quarantine
    #[error("Table {table} could not be exported: {reason}")]
    PartialExport { table: String, reason: String },

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),
}

impl ExtractError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error should abort a whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectionExhausted { .. })
    }
}

impl From<SalvageError> for ExtractError {
    fn from(err: SalvageError) -> Self {
        match err {
            SalvageError::InvalidIdentifier(name) => Self::InvalidIdentifier(name),
            SalvageError::Configuration(msg) => Self::Config(msg),
            other => Self::Config(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
