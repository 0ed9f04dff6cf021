//! Content-addressed disk cache
//!
//! Maps string keys to artifacts stored one file per key, with a codec
//! fixed per namespace.

pub mod audio;
pub mod codec;
pub mod errors;
mod finite;
pub mod key;
pub mod store;

pub use audio::AudioArtifact;
pub use codec::{Artifact, Codec};
pub use errors::CacheError;
pub use key::{hash_key, CacheId};
pub use store::{CacheRoot, CacheStats, CacheStore, Lookup, MissReason, STALE_TEMP_AGE};
