//! Error types for preset storage

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the preset store
#[derive(Error, Debug)]
pub enum PresetStoreError {
    #[error("Duplicate preset name: {0}")]
    DuplicateName(String),

    #[error("Cannot open preset database at {path:?}: {source}")]
    Unavailable {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for preset store operations
pub type Result<T> = std::result::Result<T, PresetStoreError>;
