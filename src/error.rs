//! Error types and handling for kadnode

use thiserror::Error;

/// Result type alias for kadnode operations
pub type Result<T> = std::result::Result<T, Error>;

/// kadnode error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid content identifier: {0}")]
    InvalidCid(String),

    #[error("Transport error: {0}")]
    Transport(String),
}
