//! Cache Error Types
//!
//! `CacheError` is what callers of the cache see. `DecodeError` is internal:
//! the store turns it into a cache miss and never hands it out.

use std::io;
use std::path::PathBuf;

/// Errors surfaced by the disk cache
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Storage error at {path:?}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid namespace: {0:?}")]
    InvalidNamespace(String),
}

impl CacheError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CacheError::Storage {
            path: path.into(),
            source,
        }
    }
}

/// Reasons a stored entry could not be turned back into an artifact
#[derive(Debug, thiserror::Error)]
pub(crate) enum DecodeError {
    #[error("invalid structured payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("decompression failed: {0}")]
    Decompress(#[from] io::Error),

    #[error("bad audio frame: {0}")]
    Frame(String),
}
