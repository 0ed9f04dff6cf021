//! Fetch Error Types
//!
//! Every failure is terminal for the fetch operation. Nothing here retries;
//! `is_retryable` only tells the caller whether trying again could help.

use std::fmt;
use std::time::Duration;

use super::partition::ByteRange;

/// Why a single chunk request failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkFailure {
    /// Server answered with a status we cannot use for this range
    Status(u16),
    /// Connection or body read failure
    Network(String),
    /// Body ended before the requested range was filled
    ShortRead { expected: u64, received: u64 },
    /// Body carried more bytes than the requested range
    Overrun { expected: u64 },
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkFailure::Status(status) => write!(f, "unexpected HTTP status {}", status),
            ChunkFailure::Network(msg) => write!(f, "network error: {}", msg),
            ChunkFailure::ShortRead { expected, received } => {
                write!(f, "short read: got {} of {} bytes", received, expected)
            }
            ChunkFailure::Overrun { expected } => {
                write!(f, "body longer than the {} requested bytes", expected)
            }
        }
    }
}

/// Why size discovery (HEAD, then the single-stream fallback) failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeFailure {
    /// Server answered with a non-success status
    Status(u16),
    /// Connection or body read failure
    Network(String),
    /// Response carried no usable size
    Unusable(String),
    /// Reported or streamed size is above the configured maximum
    TooLarge { limit: u64 },
}

impl fmt::Display for SizeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeFailure::Status(status) => write!(f, "unexpected HTTP status {}", status),
            SizeFailure::Network(msg) => write!(f, "network error: {}", msg),
            SizeFailure::Unusable(msg) => f.write_str(msg),
            SizeFailure::TooLarge { limit } => {
                write!(f, "resource is larger than the {} byte limit", limit)
            }
        }
    }
}

/// 408, 429 and 5xx are worth another attempt
fn retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

/// Ranged fetch errors
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Size probe failed for {url}: {cause}")]
    SizeProbe { url: String, cause: SizeFailure },

    #[error("Chunk {index} ({range}) failed: {cause}")]
    Chunk {
        index: usize,
        range: ByteRange,
        cause: ChunkFailure,
    },

    #[error("Fetch did not complete within {0:?}")]
    Timeout(Duration),

    #[error("Reassembly failed: {0}")]
    Reassembly(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl FetchError {
    /// Whether a caller-level retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) => true,
            FetchError::SizeProbe { cause, .. } => match cause {
                SizeFailure::Network(_) => true,
                SizeFailure::Status(status) => retryable_status(*status),
                SizeFailure::Unusable(_) | SizeFailure::TooLarge { .. } => false,
            },
            FetchError::Chunk { cause, .. } => match cause {
                ChunkFailure::Network(_) | ChunkFailure::ShortRead { .. } => true,
                ChunkFailure::Status(status) => retryable_status(*status),
                ChunkFailure::Overrun { .. } => false,
            },
            FetchError::Reassembly(_) | FetchError::Client(_) => false,
        }
    }

    /// Index of the failing chunk, when the failure belongs to one
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            FetchError::Chunk { index, .. } => Some(*index),
            _ => None,
        }
    }
}
