//! Error types for dbsalvage drivers

use thiserror::Error;

/// Core error type reported by drivers and connections
#[derive(Error, Debug)]
pub enum SalvageError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl SalvageError {
    /// Whether the error came from the transport or session layer rather than
    /// from the statement itself.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            SalvageError::Connection(_) | SalvageError::Io(_) | SalvageError::Timeout(_)
        )
    }
}

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, SalvageError>;
