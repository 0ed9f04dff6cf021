//! Local Disk Cache
//!
//! Content-addressed persistence of artifacts under
//! `<root>/<namespace>/<sha1(key)>.cache`. Entries are written atomically
//! through a temp file and never evicted. A corrupt entry reads as a miss
//! and is left on disk.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use super::codec::{Artifact, Codec};
use super::errors::CacheError;
use super::key::hash_key;

/// Extension of committed cache entries
const ENTRY_EXTENSION: &str = "cache";

/// Extension of in-flight temp files
const TEMP_EXTENSION: &str = "tmp";

/// Temp files untouched for this long belong to a dead writer
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

/// Directory name under the platform cache dir
const APP_DIR: &str = "mixcache";

/// Why a lookup found nothing usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// No entry on disk for this key
    Absent,
    /// An entry exists but could not be decoded
    Corrupt(String),
}

/// Outcome of a cache read
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(Artifact),
    Miss(MissReason),
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    /// The artifact on a hit, `None` on any miss
    pub fn hit(self) -> Option<Artifact> {
        match self {
            Lookup::Hit(artifact) => Some(artifact),
            Lookup::Miss(_) => None,
        }
    }
}

/// Read counters for one store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Subset of `misses` caused by undecodable entries
    pub corrupt: u64,
}

/// Handle on a cache root directory
///
/// Construct once and pass by reference to whatever needs a namespace.
#[derive(Debug, Clone)]
pub struct CacheRoot {
    root: PathBuf,
}

impl CacheRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Platform cache directory, or `./.cache` when there is none
    pub fn default_location() -> Self {
        let root = dirs::cache_dir()
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("./.cache"));
        Self::new(root)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Open the store for a namespace with the given codec
    ///
    /// The namespace directory is created here and again lazily on write.
    pub fn namespace(&self, name: &str, codec: Codec) -> Result<CacheStore, CacheError> {
        CacheStore::open(&self.root, name, codec)
    }
}

/// Key/value store for one namespace
#[derive(Debug)]
pub struct CacheStore {
    /// Namespace name (also the directory name)
    namespace: String,
    /// `<root>/<namespace>`
    dir: PathBuf,
    /// Payload codec for every entry in this namespace
    codec: Codec,
    hits: AtomicU64,
    misses: AtomicU64,
    corrupt: AtomicU64,
}

impl CacheStore {
    /// Open a namespace under `root`
    ///
    /// # Arguments
    /// * `root` - Cache root directory
    /// * `namespace` - Single path component naming the namespace
    /// * `codec` - Codec used for all entries of this namespace
    pub fn open(root: &Path, namespace: &str, codec: Codec) -> Result<Self, CacheError> {
        validate_namespace(namespace)?;

        let store = Self {
            namespace: namespace.to_string(),
            dir: root.join(namespace),
            codec,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            corrupt: AtomicU64::new(0),
        };

        store.ensure_namespace()?;
        store.cleanup();

        info!(
            namespace = %store.namespace,
            dir = %store.dir.display(),
            codec = ?codec,
            "Cache namespace opened"
        );

        Ok(store)
    }

    /// Create the namespace directory if it does not exist yet
    pub fn ensure_namespace(&self) -> Result<(), CacheError> {
        match fs::metadata(&self.dir) {
            Ok(meta) if meta.is_dir() => return Ok(()),
            Ok(_) => {
                return Err(CacheError::storage(
                    &self.dir,
                    io::Error::new(io::ErrorKind::AlreadyExists, "path exists and is not a directory"),
                ))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::storage(&self.dir, e)),
        }

        debug!(dir = %self.dir.display(), "Creating cache namespace");
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::storage(&self.dir, e))
    }

    /// Look up an artifact
    ///
    /// Missing and undecodable entries both come back as `Lookup::Miss`.
    /// Only I/O failures other than "not found" are errors.
    pub fn get(&self, key: &str) -> Result<Lookup, CacheError> {
        let path = self.entry_path(key);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(namespace = %self.namespace, key = key, "Cache MISS");
                return Ok(Lookup::Miss(MissReason::Absent));
            }
            Err(e) => return Err(CacheError::storage(path, e)),
        };

        debug!(namespace = %self.namespace, path = %path.display(), size = bytes.len(), "Loading cache entry");

        match self.codec.decode(&bytes) {
            Ok(artifact) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(namespace = %self.namespace, key = key, "Cache HIT");
                Ok(Lookup::Hit(artifact))
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.corrupt.fetch_add(1, Ordering::Relaxed);
                warn!(
                    namespace = %self.namespace,
                    key = key,
                    path = %path.display(),
                    error = %e,
                    "Corrupt cache entry, treating as miss"
                );
                Ok(Lookup::Miss(MissReason::Corrupt(e.to_string())))
            }
        }
    }

    /// Store an artifact, replacing any previous entry for the key
    ///
    /// Readers see either the old entry or the new one, never a partial file.
    pub fn set(&self, key: &str, artifact: &Artifact) -> Result<(), CacheError> {
        self.ensure_namespace()?;

        // Encode before touching the filesystem so a bad payload leaves no trace
        let data = self.codec.encode_to_vec(artifact)?;
        let path = self.entry_path(key);

        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(&format!(".{}", TEMP_EXTENSION))
            .tempfile_in(&self.dir)
            .map_err(|e| CacheError::storage(&self.dir, e))?;

        tmp.write_all(&data)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| CacheError::storage(tmp.path(), e))?;

        tmp.persist(&path)
            .map_err(|e| CacheError::storage(&path, e.error))?;

        debug!(
            namespace = %self.namespace,
            key = key,
            path = %path.display(),
            size = data.len(),
            "Stored cache entry"
        );

        Ok(())
    }

    /// Whether an entry file exists for the key (it may still be corrupt)
    pub fn contains(&self, key: &str) -> bool {
        self.entry_path(key).is_file()
    }

    /// Remove the entry for a key, if any
    pub fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(namespace = %self.namespace, key = key, "Invalidated cache entry");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::storage(path, e)),
        }
    }

    /// On-disk location of the entry for a key
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", hash_key(key), ENTRY_EXTENSION))
    }

    /// Clean up temp files left behind by interrupted writes
    ///
    /// Only temp files older than [`STALE_TEMP_AGE`] are removed; younger
    /// ones may belong to a `set` still running in another handle or process.
    pub fn cleanup(&self) {
        let Ok(read_dir) = fs::read_dir(&self.dir) else {
            return;
        };
        let now = SystemTime::now();
        for entry in read_dir.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == TEMP_EXTENSION) {
                continue;
            }
            let age = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if age.is_some_and(|age| age >= STALE_TEMP_AGE) {
                debug!(path = %path.display(), "Removing stale temp file");
                let _ = fs::remove_file(&path);
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            corrupt: self.corrupt.load(Ordering::Relaxed),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn validate_namespace(name: &str) -> Result<(), CacheError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(()),
        _ => Err(CacheError::InvalidNamespace(name.to_string())),
    }
}
