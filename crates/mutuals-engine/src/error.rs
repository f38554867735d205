//! Error types for the engine.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The backing member store failed
    #[error("Store error: {0}")]
    Store(String),

    /// Member does not exist
    #[error("Member not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The recompute worker has shut down
    #[error("Recompute worker is no longer running")]
    WorkerClosed,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
