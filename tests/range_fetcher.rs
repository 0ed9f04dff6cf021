//! Integration tests for RangeFetcher.
//!
//! Uses wiremock for HTTP mocking. Per-range response delays force chunks to
//! complete out of order; reassembly must still follow chunk index.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mixcache::fetch::{
    ChunkFailure, FetchError, FetcherConfig, SizeFailure, RangeFetcher, DEFAULT_MAX_SIZE,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const TRACK: &str = "/audio/track.opus";

fn resource(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8 ^ (i / 253) as u8).collect()
}

async fn mount_head(server: &MockServer, body: &[u8]) {
    Mock::given(method("HEAD"))
        .and(path(TRACK))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

async fn mount_range(server: &MockServer, data: &[u8], start: usize, end: usize, delay_ms: u64) {
    Mock::given(method("GET"))
        .and(path(TRACK))
        .and(header("range", format!("bytes={}-{}", start, end).as_str()))
        .respond_with(
            ResponseTemplate::new(206)
                .set_body_bytes(data[start..=end].to_vec())
                .insert_header("content-range", format!("bytes {}-{}/{}", start, end, data.len()).as_str())
                .set_delay(Duration::from_millis(delay_ms)),
        )
        .mount(server)
        .await;
}

/// Serves any `Range: bytes=a-b` request from `data` after a fixed delay and
/// records when each request arrived
struct DelayedRanges {
    data: Vec<u8>,
    delay: Duration,
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Respond for DelayedRanges {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());

        let range = request
            .headers
            .get("range")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("bytes="))
            .and_then(|value| value.split_once('-'))
            .and_then(|(start, end)| Some((start.parse::<usize>().ok()?, end.parse::<usize>().ok()?)));

        match range {
            Some((start, end)) if start <= end && end < self.data.len() => ResponseTemplate::new(206)
                .set_body_bytes(self.data[start..=end].to_vec())
                .set_delay(self.delay),
            _ => ResponseTemplate::new(416),
        }
    }
}

/// Most arrivals inside any window shorter than `window`
///
/// Every response is held back for `window`, so requests arriving closer
/// together than that were all in flight at the same moment.
fn peak_in_flight(arrivals: &[Instant], window: Duration) -> usize {
    let mut sorted = arrivals.to_vec();
    sorted.sort();
    (0..sorted.len())
        .map(|i| {
            sorted[i..]
                .iter()
                .take_while(|t| t.duration_since(sorted[i]) < window)
                .count()
        })
        .max()
        .unwrap_or(0)
}

fn fetcher(chunk_size: u64) -> RangeFetcher {
    RangeFetcher::new(FetcherConfig::default().with_chunk_size(chunk_size)).expect("client")
}

#[tokio::test]
async fn test_three_chunks_reassembled_despite_reverse_completion() {
    let server = MockServer::start().await;
    let data = resource(2_500_000);
    mount_head(&server, &data).await;

    // Completion order: chunk 2, then 0, then 1
    mount_range(&server, &data, 0, 999_999, 150).await;
    mount_range(&server, &data, 1_000_000, 1_999_999, 400).await;
    mount_range(&server, &data, 2_000_000, 2_499_999, 0).await;

    let out = fetcher(1_000_000)
        .fetch(&format!("{}{}", server.uri(), TRACK))
        .await
        .expect("fetch failed");

    assert_eq!(out.len(), 2_500_000);
    assert!(out == data, "reassembled bytes differ from the source");
}

#[tokio::test]
async fn test_probe_size_reads_content_length() {
    let server = MockServer::start().await;
    mount_head(&server, &resource(12_345)).await;

    let size = fetcher(1_000)
        .probe_size(&format!("{}{}", server.uri(), TRACK))
        .await
        .expect("probe failed");
    assert_eq!(size, 12_345);
}

#[tokio::test]
async fn test_many_chunks_with_bounded_concurrency() {
    let server = MockServer::start().await;
    let data = resource(10_000);
    mount_head(&server, &data).await;

    // 10 chunks of 1000 bytes, each answered 200ms after it arrives
    let delay = Duration::from_millis(200);
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    Mock::given(method("GET"))
        .and(path(TRACK))
        .respond_with(DelayedRanges {
            data: data.clone(),
            delay,
            arrivals: Arc::clone(&arrivals),
        })
        .mount(&server)
        .await;

    let received = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&received);
    let fetcher = RangeFetcher::new(
        FetcherConfig::default()
            .with_chunk_size(1_000)
            .with_concurrency(3),
    )
    .expect("client")
    .with_progress(move |n| {
        counter.fetch_add(n, Ordering::Relaxed);
    });

    let out = fetcher
        .fetch(&format!("{}{}", server.uri(), TRACK))
        .await
        .expect("fetch failed");

    assert_eq!(out, data);
    assert_eq!(received.load(Ordering::Relaxed), 10_000);

    let arrivals = arrivals.lock().unwrap();
    assert_eq!(arrivals.len(), 10);
    let peak = peak_in_flight(&arrivals, delay);
    assert!(peak <= 3, "{} range requests were in flight at once", peak);
    assert!(peak > 1, "range requests never overlapped");
}

#[tokio::test]
async fn test_oversized_content_length_is_refused() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path(TRACK))
        .respond_with(ResponseTemplate::new(200).insert_header("content-length", "1000000000000000000"))
        .mount(&server)
        .await;
    // The refusal is final: no fallback download happens
    Mock::given(method("GET"))
        .and(path(TRACK))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(resource(100)))
        .expect(0)
        .mount(&server)
        .await;

    let url = format!("{}{}", server.uri(), TRACK);
    let fetcher = fetcher(1_000_000);

    let err = fetcher.probe_size(&url).await.unwrap_err();
    assert!(matches!(
        err,
        FetchError::SizeProbe {
            cause: SizeFailure::TooLarge { limit: DEFAULT_MAX_SIZE },
            ..
        }
    ));

    let err = fetcher.fetch(&url).await.unwrap_err();
    assert!(
        matches!(
            err,
            FetchError::SizeProbe {
                cause: SizeFailure::TooLarge { .. },
                ..
            }
        ),
        "got {:?}",
        err
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_single_stream_stops_at_max_size() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path(TRACK))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TRACK))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(resource(5_000)))
        .mount(&server)
        .await;

    let fetcher = RangeFetcher::new(FetcherConfig::default().with_max_size(4_096)).expect("client");
    let err = fetcher
        .fetch(&format!("{}{}", server.uri(), TRACK))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::SizeProbe {
            cause: SizeFailure::TooLarge { limit: 4_096 },
            ..
        }
    ));
}

#[tokio::test]
async fn test_zero_size_falls_back_to_single_stream() {
    let server = MockServer::start().await;
    let data = resource(5_000);

    Mock::given(method("HEAD"))
        .and(path(TRACK))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TRACK))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(data.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let out = fetcher(1_000)
        .fetch(&format!("{}{}", server.uri(), TRACK))
        .await
        .expect("fallback failed");
    assert_eq!(out, data);
}

#[tokio::test]
async fn test_failed_probe_falls_back_to_single_stream() {
    let server = MockServer::start().await;
    let data = resource(3_000);

    Mock::given(method("HEAD"))
        .and(path(TRACK))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TRACK))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(data.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let out = fetcher(1_000)
        .fetch(&format!("{}{}", server.uri(), TRACK))
        .await
        .expect("fallback failed");
    assert_eq!(out, data);
}

#[tokio::test]
async fn test_fallback_failure_is_a_probe_error() {
    let server = MockServer::start().await;

    // No HEAD mock (404) and the GET fails too
    Mock::given(method("GET"))
        .and(path(TRACK))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = fetcher(1_000)
        .fetch(&format!("{}{}", server.uri(), TRACK))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            FetchError::SizeProbe {
                cause: SizeFailure::Status(404),
                ..
            }
        ),
        "got {:?}",
        err
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_failing_chunk_fails_whole_fetch() {
    let server = MockServer::start().await;
    let data = resource(3_000);
    mount_head(&server, &data).await;

    Mock::given(method("GET"))
        .and(path(TRACK))
        .and(header("range", "bytes=0-999"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(data[..1_000].to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TRACK))
        .and(header("range", "bytes=1000-1999"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TRACK))
        .and(header("range", "bytes=2000-2999"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(data[2_000..].to_vec()))
        .mount(&server)
        .await;

    let err = fetcher(1_000)
        .fetch(&format!("{}{}", server.uri(), TRACK))
        .await
        .unwrap_err();

    match err {
        FetchError::Chunk { index, range, cause } => {
            assert_eq!(index, 1);
            assert_eq!((range.start, range.end), (1_000, 1_999));
            assert_eq!(cause, ChunkFailure::Status(503));
        }
        other => panic!("expected chunk error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_short_chunk_is_rejected() {
    let server = MockServer::start().await;
    let data = resource(2_000);
    mount_head(&server, &data).await;

    mount_range(&server, &data, 0, 999, 0).await;
    Mock::given(method("GET"))
        .and(path(TRACK))
        .and(header("range", "bytes=1000-1999"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(data[1_000..1_500].to_vec()))
        .mount(&server)
        .await;

    let err = fetcher(1_000)
        .fetch(&format!("{}{}", server.uri(), TRACK))
        .await
        .unwrap_err();

    assert_eq!(err.chunk_index(), Some(1));
    assert!(matches!(
        err,
        FetchError::Chunk {
            cause: ChunkFailure::ShortRead {
                expected: 1_000,
                received: 500
            },
            ..
        }
    ));
}

#[tokio::test]
async fn test_server_ignoring_range_is_rejected() {
    let server = MockServer::start().await;
    let data = resource(2_000);
    mount_head(&server, &data).await;

    // Full body with 200 for every ranged request
    Mock::given(method("GET"))
        .and(path(TRACK))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(data.clone()))
        .mount(&server)
        .await;

    let err = fetcher(1_000)
        .fetch(&format!("{}{}", server.uri(), TRACK))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::Chunk {
            cause: ChunkFailure::Status(200),
            ..
        }
    ));
}

#[tokio::test]
async fn test_oversized_chunk_is_rejected() {
    let server = MockServer::start().await;
    let data = resource(1_500);
    mount_head(&server, &data).await;

    mount_range(&server, &data, 1_000, 1_499, 0).await;
    Mock::given(method("GET"))
        .and(path(TRACK))
        .and(header("range", "bytes=0-999"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(data.clone()))
        .mount(&server)
        .await;

    let err = fetcher(1_000)
        .fetch(&format!("{}{}", server.uri(), TRACK))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::Chunk {
            index: 0,
            cause: ChunkFailure::Overrun { expected: 1_000 },
            ..
        }
    ));
}

#[tokio::test]
async fn test_single_chunk_accepts_plain_ok() {
    let server = MockServer::start().await;
    let data = resource(800);
    mount_head(&server, &data).await;

    Mock::given(method("GET"))
        .and(path(TRACK))
        .and(header("range", "bytes=0-799"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(data.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let out = fetcher(1_000)
        .fetch(&format!("{}{}", server.uri(), TRACK))
        .await
        .expect("fetch failed");
    assert_eq!(out, data);
}

#[tokio::test]
async fn test_join_timeout_bounds_stuck_chunk() {
    let server = MockServer::start().await;
    let data = resource(2_000);
    mount_head(&server, &data).await;

    Mock::given(method("GET"))
        .and(path(TRACK))
        .respond_with(
            ResponseTemplate::new(206)
                .set_body_bytes(data[..1_000].to_vec())
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let fetcher = RangeFetcher::new(
        FetcherConfig::default()
            .with_chunk_size(1_000)
            .with_join_timeout(Duration::from_millis(300)),
    )
    .expect("client");

    let err = fetcher
        .fetch(&format!("{}{}", server.uri(), TRACK))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Timeout(_)));
}
