//! Parallel ranged HTTP fetcher
//!
//! One fetch goes through size probe, partition, fetching, reassembly.
//! The size is probed with HEAD. A usable size leads to concurrent
//! `Range` requests whose chunks are put back together by index. A missing
//! or zero size falls back to a single streamed GET whose body is the
//! result. Sizes above `FetcherConfig::max_size` are refused on both paths.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info, trace, warn};

use super::errors::{ChunkFailure, FetchError, SizeFailure};
use super::partition::{partition, reassemble, ByteRange, RangeChunk};

/// Default chunk size: 1 MB
pub const DEFAULT_CHUNK_SIZE: u64 = 1_000_000;

/// Default number of chunk requests in flight
pub const DEFAULT_CONCURRENCY: usize = 12;

/// Default upper bound for one resource: 4 GiB
pub const DEFAULT_MAX_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Advisory progress callback, called with the size of each received part
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Tuning for a [`RangeFetcher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    /// Bytes per range request
    pub chunk_size: u64,
    /// Maximum range requests in flight
    pub concurrency: usize,
    /// Per-request timeout on the HTTP client
    pub request_timeout: Option<Duration>,
    /// Upper bound for a whole fetch, so a stuck request cannot hang the join
    pub join_timeout: Option<Duration>,
    /// Largest resource the fetcher will hold in memory
    pub max_size: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout: None,
            join_timeout: None,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl FetcherConfig {
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = Some(timeout);
        self
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size.max(1);
        self
    }
}

/// Downloads one resource as concurrent byte ranges
#[derive(Clone)]
pub struct RangeFetcher {
    http_client: Client,
    config: FetcherConfig,
    progress: Option<ProgressFn>,
}

impl RangeFetcher {
    /// Create a fetcher with its own HTTP client
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self::with_client(http_client, config))
    }

    /// Create a fetcher on top of an existing HTTP client
    pub fn with_client(http_client: Client, config: FetcherConfig) -> Self {
        Self {
            http_client,
            config,
            progress: None,
        }
    }

    /// Report received byte counts to `progress`
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch the full resource at `url`
    ///
    /// Returns exactly the resource bytes or a single terminal error; no
    /// partial data is ever returned.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        match self.config.join_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(url))
                .await
                .map_err(|_| FetchError::Timeout(limit))?,
            None => self.run(url).await,
        }
    }

    async fn run(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let total_size = match self.probe_size(url).await {
            Ok(size) => size,
            Err(
                e @ FetchError::SizeProbe {
                    cause: SizeFailure::TooLarge { .. },
                    ..
                },
            ) => return Err(e),
            Err(e) => {
                warn!(url = url, error = %e, "Size probe unusable, falling back to a single stream");
                return self.fetch_whole(url).await;
            }
        };

        let ranges = partition(total_size, self.config.chunk_size);
        debug!(
            url = url,
            size = total_size,
            chunks = ranges.len(),
            chunk_size = self.config.chunk_size,
            concurrency = self.config.concurrency,
            "Partitioned download"
        );

        let chunks = self.fetch_chunks(url, &ranges, total_size).await?;

        debug!(url = url, chunks = chunks.len(), "Reassembling chunks");
        let data = reassemble(total_size, chunks)?;

        info!(url = url, size = data.len(), "Download complete");
        Ok(data)
    }

    /// Ask the server for the resource size with a HEAD request
    ///
    /// A missing, unparsable or zero `Content-Length` is an error, and so is
    /// a size above `max_size` or one that cannot be addressed in memory.
    pub async fn probe_size(&self, url: &str) -> Result<u64, FetchError> {
        let probe_err = |cause: SizeFailure| FetchError::SizeProbe {
            url: url.to_string(),
            cause,
        };

        let response = self
            .http_client
            .head(url)
            .send()
            .await
            .map_err(|e| probe_err(SizeFailure::Network(e.to_string())))?;

        if !response.status().is_success() {
            return Err(probe_err(SizeFailure::Status(response.status().as_u16())));
        }

        // Read the header itself: the body of a HEAD response is always empty
        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .ok_or_else(|| probe_err(SizeFailure::Unusable("missing or invalid Content-Length".into())))?;

        if size == 0 {
            return Err(probe_err(SizeFailure::Unusable("Content-Length is zero".into())));
        }
        if size > self.config.max_size || usize::try_from(size).is_err() {
            warn!(url = url, size = size, limit = self.config.max_size, "Refusing oversized resource");
            return Err(probe_err(SizeFailure::TooLarge {
                limit: self.config.max_size,
            }));
        }

        debug!(url = url, size = size, "Probed resource size");
        Ok(size)
    }

    /// Run every range request through a bounded fan-out
    ///
    /// The first failing chunk aborts the fetch and drops the requests
    /// still in flight.
    async fn fetch_chunks(
        &self,
        url: &str,
        ranges: &[ByteRange],
        total_size: u64,
    ) -> Result<Vec<RangeChunk>, FetchError> {
        let mut in_flight = stream::iter(ranges.iter().copied().enumerate())
            .map(|(index, range)| self.fetch_range(url, index, range, total_size))
            .buffer_unordered(self.config.concurrency.max(1));

        let mut chunks = Vec::with_capacity(ranges.len());
        while let Some(result) = in_flight.next().await {
            let chunk = result?;
            trace!(index = chunk.index, size = chunk.payload.len(), "Chunk complete");
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    /// Download one inclusive byte range
    async fn fetch_range(
        &self,
        url: &str,
        index: usize,
        range: ByteRange,
        total_size: u64,
    ) -> Result<RangeChunk, FetchError> {
        let chunk_err = |cause: ChunkFailure| FetchError::Chunk {
            index,
            range,
            cause,
        };

        trace!(index = index, start = range.start, end = range.end, "Requesting chunk");

        let response = self
            .http_client
            .get(url)
            .header(RANGE, range.header_value())
            .send()
            .await
            .map_err(|e| chunk_err(ChunkFailure::Network(e.to_string())))?;

        // 200 means the server ignored the range, only fine if we asked for everything
        let status = response.status();
        let covers_all = range.start == 0 && range.len() == total_size;
        let accepted = status == StatusCode::PARTIAL_CONTENT || (status == StatusCode::OK && covers_all);
        if !accepted {
            return Err(chunk_err(ChunkFailure::Status(status.as_u16())));
        }

        let expected = range.len();
        let payload = self
            .read_body(response, expected)
            .await
            .map_err(chunk_err)?;

        if (payload.len() as u64) < expected {
            return Err(chunk_err(ChunkFailure::ShortRead {
                expected,
                received: payload.len() as u64,
            }));
        }

        Ok(RangeChunk {
            index,
            range,
            payload,
        })
    }

    /// Degraded path: stream the whole resource in one GET and keep its body
    async fn fetch_whole(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let probe_err = |cause: SizeFailure| FetchError::SizeProbe {
            url: url.to_string(),
            cause,
        };

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| probe_err(SizeFailure::Network(e.to_string())))?;

        if !response.status().is_success() {
            return Err(probe_err(SizeFailure::Status(response.status().as_u16())));
        }

        let limit = self.config.max_size;
        let data = self
            .read_body(response, limit)
            .await
            .map_err(|cause| {
                probe_err(match cause {
                    ChunkFailure::Overrun { .. } => SizeFailure::TooLarge { limit },
                    ChunkFailure::Network(msg) => SizeFailure::Network(msg),
                    other => SizeFailure::Unusable(other.to_string()),
                })
            })?;

        info!(url = url, size = data.len(), "Download complete (single stream)");
        Ok(data)
    }

    /// Stream a response body, refusing to grow past `limit` bytes
    async fn read_body(&self, mut response: Response, limit: u64) -> Result<Vec<u8>, ChunkFailure> {
        // Preallocate at most one chunk; the fallback limit is only a ceiling
        let capacity = limit.min(self.config.chunk_size);
        let mut body = Vec::with_capacity(usize::try_from(capacity).unwrap_or(0));

        while let Some(part) = response
            .chunk()
            .await
            .map_err(|e| ChunkFailure::Network(e.to_string()))?
        {
            if (body.len() + part.len()) as u64 > limit {
                return Err(ChunkFailure::Overrun { expected: limit });
            }
            body.extend_from_slice(&part);
            if let Some(progress) = &self.progress {
                progress(part.len() as u64);
            }
        }

        Ok(body)
    }
}
