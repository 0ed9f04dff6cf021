//! mixcache - fetch remote audio once, keep it on disk
//!
//! Two independent pieces, composed by the caller:
//!
//! - [`fetch::RangeFetcher`] downloads a resource as concurrent HTTP byte
//!   ranges and reassembles them in order.
//! - [`cache::CacheStore`] persists artifacts (structured JSON values or
//!   audio) on disk, one file per key, with corrupt entries read as misses.
//!
//! ```rust,no_run
//! use mixcache::cache::{Artifact, CacheRoot, Codec, Lookup};
//! use mixcache::fetch::{FetcherConfig, RangeFetcher};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let root = CacheRoot::default_location();
//! let meta = root.namespace("metadata", Codec::Structured)?;
//!
//! let url = "https://example.com/track.json";
//! if let Lookup::Miss(_) = meta.get(url)? {
//!     let bytes = RangeFetcher::new(FetcherConfig::default())?.fetch(url).await?;
//!     let value: serde_json::Value = serde_json::from_slice(&bytes)?;
//!     meta.set(url, &Artifact::Structured(value))?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod fetch;

pub use cache::{Artifact, AudioArtifact, CacheError, CacheRoot, CacheStore, Codec, Lookup};
pub use config::Config;
pub use fetch::{FetchError, FetcherConfig, RangeFetcher};
