//! Parallel ranged HTTP downloads

pub mod errors;
pub mod partition;
pub mod ranged;

pub use errors::{ChunkFailure, FetchError, SizeFailure};
pub use partition::{partition, reassemble, ByteRange, RangeChunk};
pub use ranged::{
    FetcherConfig, ProgressFn, RangeFetcher, DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, DEFAULT_MAX_SIZE,
};
