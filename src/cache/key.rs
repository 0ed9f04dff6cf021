//! Cache key hashing
//!
//! Maps arbitrary caller keys (URLs, track ids, ...) to fixed-width,
//! filesystem-safe identifiers.

use std::fmt;

use sha1::{Digest, Sha1};

/// Hex-encoded SHA-1 digest of a cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheId(String);

impl CacheId {
    /// Length of every identifier, in characters
    pub const LEN: usize = 40;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a cache key into its on-disk identifier
pub fn hash_key(key: &str) -> CacheId {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    CacheId(format!("{:x}", hasher.finalize()))
}
