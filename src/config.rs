//! Runtime configuration
//!
//! Read from the environment:
//!
//! | variable                | meaning                        | default              |
//! |-------------------------|--------------------------------|----------------------|
//! | `MIXCACHE_DIR`          | cache root directory           | platform cache dir   |
//! | `MIXCACHE_CHUNK_SIZE`   | bytes per range request        | 1000000              |
//! | `MIXCACHE_CONCURRENCY`  | range requests in flight       | 12                   |
//! | `MIXCACHE_TIMEOUT_SECS` | upper bound for a whole fetch  | none                 |
//! | `MIXCACHE_MAX_SIZE`     | largest resource, in bytes     | 4294967296           |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::cache::CacheRoot;
use crate::fetch::FetcherConfig;

pub const ENV_CACHE_DIR: &str = "MIXCACHE_DIR";
pub const ENV_CHUNK_SIZE: &str = "MIXCACHE_CHUNK_SIZE";
pub const ENV_CONCURRENCY: &str = "MIXCACHE_CONCURRENCY";
pub const ENV_TIMEOUT_SECS: &str = "MIXCACHE_TIMEOUT_SECS";
pub const ENV_MAX_SIZE: &str = "MIXCACHE_MAX_SIZE";

#[derive(Debug, Clone)]
pub struct Config {
    pub cache_root: CacheRoot,
    pub fetcher: FetcherConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_root: CacheRoot::default_location(),
            fetcher: FetcherConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from any variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|d| !d.trim().is_empty()) {
            config.cache_root = CacheRoot::new(PathBuf::from(dir));
        }
        if let Some(size) = parse_var::<u64>(&lookup, ENV_CHUNK_SIZE) {
            config.fetcher = config.fetcher.with_chunk_size(size);
        }
        if let Some(n) = parse_var::<usize>(&lookup, ENV_CONCURRENCY) {
            config.fetcher = config.fetcher.with_concurrency(n);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_TIMEOUT_SECS) {
            config.fetcher = config.fetcher.with_join_timeout(Duration::from_secs(secs));
        }
        if let Some(bytes) = parse_var::<u64>(&lookup, ENV_MAX_SIZE) {
            config.fetcher = config.fetcher.with_max_size(bytes);
        }

        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}
