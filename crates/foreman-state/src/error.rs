//! Error types for foreman-state

use thiserror::Error;

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend unavailable or misbehaving
    #[error("storage backend failed: {0}")]
    Backend(String),

    /// Key not present in the store
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// Key rejected by the backend
    #[error("invalid key: {key}")]
    InvalidKey { key: String },

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Underlying I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
