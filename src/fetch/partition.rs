//! Byte range partitioning and ordered reassembly
//!
//! A resource of `total_size` bytes is cut into contiguous inclusive ranges
//! of `chunk_size` bytes (the last one may be shorter). Chunks come back in
//! any order; reassembly always concatenates them by index.

use std::fmt;

use super::errors::FetchError;

/// Inclusive byte range `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "empty byte range {}-{}", start, end);
        Self { start, end }
    }

    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the HTTP `Range` request header
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

/// One fetched piece of the resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeChunk {
    /// Position of this chunk in the partition
    pub index: usize,
    pub range: ByteRange,
    pub payload: Vec<u8>,
}

/// Ranges reserved up front; longer partitions grow as they go
const MAX_PREALLOCATED_RANGES: u64 = 4096;

/// Split `[0, total_size)` into ranges of at most `chunk_size` bytes
pub fn partition(total_size: u64, chunk_size: u64) -> Vec<ByteRange> {
    let chunk_size = chunk_size.max(1);
    let count = total_size.div_ceil(chunk_size).min(MAX_PREALLOCATED_RANGES);
    let mut ranges = Vec::with_capacity(count as usize);
    let mut start = 0;
    while start < total_size {
        let end = start.saturating_add(chunk_size).min(total_size) - 1;
        ranges.push(ByteRange::new(start, end));
        start = end + 1;
    }
    ranges
}

/// Concatenate chunks in index order into one buffer of `total_size` bytes
///
/// Input order is irrelevant. The chunks must form the exact partition of
/// `[0, total_size)`: consecutive indices, no gaps, no overlaps, and every
/// payload as long as its range.
pub fn reassemble(total_size: u64, mut chunks: Vec<RangeChunk>) -> Result<Vec<u8>, FetchError> {
    chunks.sort_unstable_by_key(|chunk| chunk.index);

    let capacity = usize::try_from(total_size)
        .map_err(|_| FetchError::Reassembly(format!("{} bytes do not fit in memory", total_size)))?;
    let mut out = Vec::with_capacity(capacity);
    let mut cursor = 0u64;

    for (position, chunk) in chunks.into_iter().enumerate() {
        if chunk.index != position {
            return Err(FetchError::Reassembly(format!(
                "expected chunk {}, found chunk {}",
                position, chunk.index
            )));
        }
        if chunk.range.start != cursor {
            return Err(FetchError::Reassembly(format!(
                "chunk {} starts at {}, expected {}",
                chunk.index, chunk.range.start, cursor
            )));
        }
        if chunk.payload.len() as u64 != chunk.range.len() {
            return Err(FetchError::Reassembly(format!(
                "chunk {} holds {} bytes for a {}-byte range",
                chunk.index,
                chunk.payload.len(),
                chunk.range.len()
            )));
        }
        out.extend_from_slice(&chunk.payload);
        cursor = chunk.range.end + 1;
    }

    if cursor != total_size {
        return Err(FetchError::Reassembly(format!(
            "reassembled {} bytes, expected {}",
            cursor, total_size
        )));
    }
    Ok(out)
}
