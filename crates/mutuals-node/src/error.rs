//! Error types for the node.

use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in node operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] mutuals_engine::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<Error> for mutuals_engine::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Engine(inner) => inner,
            Error::NotFound(what) => mutuals_engine::Error::NotFound(what),
            Error::InvalidInput(what) => mutuals_engine::Error::InvalidInput(what),
            Error::Serialization(inner) => mutuals_engine::Error::Serialization(inner),
            other => mutuals_engine::Error::Store(other.to_string()),
        }
    }
}
