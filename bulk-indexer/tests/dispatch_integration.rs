//! Integration tests for the bulk dispatcher.
//!
//! These tests drive the real dispatcher against a mock sink with counters and
//! failure injection, and against the in-memory sink.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bulk_indexer::{
    BulkDispatcher, CollectingErrorSink, DispatchError, DispatchStrategy, DispatcherConfig,
};
use bulk_indexer_repository::{
    BulkWriteSink, InMemorySink, SessionOptions, SessionStats, SinkError, SinkSession,
};
use bulk_indexer_shared::{Document, DocumentBatch};
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

// Shared state of a mock sink
#[derive(Default)]
struct MockState {
    fail_on: Option<u64>,
    fail_close: bool,
    write_delay: Option<Duration>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    options: Mutex<Vec<SessionOptions>>,
    writes: Mutex<Vec<(Option<String>, u64)>>,
}

// Mock sink for testing
#[derive(Clone, Default)]
struct MockSink {
    state: Arc<MockState>,
}

impl MockSink {
    fn new() -> Self {
        Self::default()
    }

    fn with_state(state: MockState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    fn failing_on(ordinal: u64) -> Self {
        Self::with_state(MockState {
            fail_on: Some(ordinal),
            ..MockState::default()
        })
    }

    fn failing_close() -> Self {
        Self::with_state(MockState {
            fail_close: true,
            ..MockState::default()
        })
    }

    fn slow(delay: Duration) -> Self {
        Self::with_state(MockState {
            write_delay: Some(delay),
            ..MockState::default()
        })
    }

    fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    fn first_options(&self) -> SessionOptions {
        self.state.options.lock().unwrap()[0]
    }

    fn written(&self) -> Vec<u64> {
        let mut written: Vec<u64> = self
            .state
            .writes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, n)| *n)
            .collect();
        written.sort_unstable();
        written
    }

    fn ids(&self) -> Vec<Option<String>> {
        self.state
            .writes
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}

struct MockSession {
    state: Arc<MockState>,
    closed: AtomicBool,
}

#[async_trait::async_trait]
impl BulkWriteSink for MockSink {
    async fn open(
        &self,
        _target: &str,
        options: SessionOptions,
        _cancellation: CancellationToken,
    ) -> Result<Box<dyn SinkSession>, SinkError> {
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(active, Ordering::SeqCst);
        self.state.options.lock().unwrap().push(options);

        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

#[async_trait::async_trait]
impl SinkSession for MockSession {
    async fn write_one(&self, id: Option<String>, document: Value) -> Result<(), SinkError> {
        if let Some(delay) = self.state.write_delay {
            tokio::time::sleep(delay).await;
        }
        let n = document["n"].as_u64().unwrap_or_default();
        if self.state.fail_on == Some(n) {
            return Err(SinkError::write(format!("document {} rejected", n)));
        }
        self.state.writes.lock().unwrap().push((id, n));
        Ok(())
    }

    async fn close(&self) -> Result<SessionStats, SinkError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(SessionStats::default());
        }
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        self.state.active.fetch_sub(1, Ordering::SeqCst);
        if self.state.fail_close {
            return Err(SinkError::flush("bulk request failed"));
        }
        Ok(SessionStats::default())
    }
}

fn documents(count: u64) -> DocumentBatch {
    (1..=count)
        .map(|n| {
            let mut document = Document::new();
            document.insert("n".to_string(), json!(n));
            document.insert("title".to_string(), json!(format!("Test Document {}", n)));
            document
        })
        .collect()
}

fn dispatcher(sink: &MockSink) -> BulkDispatcher {
    BulkDispatcher::new(Arc::new(sink.clone()))
}

async fn within_timeout<F: Future>(future: F) -> F::Output {
    timeout(TEST_TIMEOUT, future)
        .await
        .expect("dispatch did not finish in time")
}

#[tokio::test]
async fn test_sequential_stops_at_first_failure() {
    let sink = MockSink::failing_on(3);
    let token = CancellationToken::new();

    let result = within_timeout(dispatcher(&sink).dispatch_sequential(
        &token,
        "books",
        &documents(5),
    ))
    .await;

    let error = result.unwrap_err();
    assert!(matches!(error, DispatchError::Write { ordinal: 3, .. }));
    assert_eq!(sink.written(), vec![1, 2]);
    assert_eq!(sink.opened(), 1);
    assert_eq!(sink.closed(), 1);
}

#[tokio::test]
async fn test_sequential_writes_in_order_with_ordinal_ids() {
    let sink = MockSink::new();
    let token = CancellationToken::new();

    let summary = within_timeout(dispatcher(&sink).dispatch_sequential(
        &token,
        "books",
        &documents(4),
    ))
    .await
    .unwrap();

    assert_eq!(summary.submitted, 4);
    assert_eq!(summary.sessions, 1);
    assert_eq!(
        sink.ids(),
        vec![
            Some("1".to_string()),
            Some("2".to_string()),
            Some("3".to_string()),
            Some("4".to_string())
        ]
    );
    assert_eq!(sink.first_options(), SessionOptions::immediate());
}

#[tokio::test]
async fn test_bulk_queues_in_order_through_one_buffered_session() {
    let sink = MockSink::new();
    let token = CancellationToken::new();

    let summary = within_timeout(dispatcher(&sink).dispatch(
        &token,
        "books",
        &documents(3),
        DispatchStrategy::Bulk,
    ))
    .await
    .unwrap();

    assert_eq!(summary.strategy, "bulk");
    assert_eq!(summary.submitted, 3);
    assert_eq!(summary.sessions, 1);
    assert_eq!(
        sink.ids(),
        vec![
            Some("1".to_string()),
            Some("2".to_string()),
            Some("3".to_string())
        ]
    );
    assert_eq!(sink.first_options(), SessionOptions::buffered());
    assert_eq!(sink.closed(), 1);
}

#[tokio::test]
async fn test_bulk_stops_at_first_serialization_failure() {
    let sink = MockSink::new();
    let token = CancellationToken::new();
    let batch: DocumentBatch<Flaky> = (1..=6).map(Flaky).collect();

    let error = within_timeout(dispatcher(&sink).dispatch_bulk(&token, "books", &batch))
        .await
        .unwrap_err();

    assert!(matches!(error, DispatchError::Serialization { ordinal: 4, .. }));
    assert_eq!(sink.written(), vec![1, 2, 3]);
    assert_eq!(sink.closed(), 1);
}

#[tokio::test]
async fn test_bulk_surfaces_flush_failure_on_close() {
    let sink = MockSink::failing_close();
    let token = CancellationToken::new();

    let error = within_timeout(dispatcher(&sink).dispatch_bulk(&token, "books", &documents(5)))
        .await
        .unwrap_err();

    assert!(matches!(error, DispatchError::Flush(SinkError::FlushError(_))));
    assert_eq!(sink.written().len(), 5);
    assert_eq!(sink.closed(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_chunked_reports_one_error_after_all_units_finish() {
    let sink = MockSink::failing_on(450);
    let errors = Arc::new(CollectingErrorSink::new());
    let dispatcher = dispatcher(&sink).with_error_sink(errors.clone());
    let token = CancellationToken::new();

    let result = within_timeout(dispatcher.dispatch_chunked(
        &token,
        "books",
        &documents(1000),
        100,
        16,
    ))
    .await;

    let error = result.unwrap_err();
    match &error {
        DispatchError::Aggregate { unit, .. } => assert!(unit.contains("chunk 4")),
        other => panic!("expected aggregate error, got {:?}", other),
    }
    assert_eq!(error.ordinal(), Some(450));
    assert_eq!(errors.len(), 1);

    assert_eq!(sink.opened(), 10);
    assert_eq!(sink.closed(), 10);
    // Chunk 4 stops at its failing document; every other chunk is fully written.
    assert_eq!(sink.written().len(), 1000 - 51);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_chunked_writes_without_ids() {
    let sink = MockSink::new();
    let token = CancellationToken::new();

    let summary = within_timeout(dispatcher(&sink).dispatch_chunked(
        &token,
        "books",
        &documents(1000),
        100,
        4,
    ))
    .await
    .unwrap();

    assert_eq!(summary.units, 10);
    assert_eq!(summary.sessions, 10);
    assert_eq!(summary.submitted, 1000);
    assert_eq!(sink.written(), (1..=1000).collect::<Vec<_>>());
    assert!(sink.ids().iter().all(Option::is_none));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_chunked_bounds_concurrent_sessions() {
    let sink = MockSink::slow(Duration::from_millis(1));
    let token = CancellationToken::new();

    within_timeout(dispatcher(&sink).dispatch_chunked(
        &token,
        "books",
        &documents(200),
        10,
        3,
    ))
    .await
    .unwrap();

    assert_eq!(sink.opened(), 20);
    assert_eq!(sink.closed(), 20);
    assert!(sink.max_active() <= 3);
}

#[tokio::test]
async fn test_unbounded_concurrency_is_clamped() {
    let sink = MockSink::new();
    let token = CancellationToken::new();

    let summary = within_timeout(dispatcher(&sink).dispatch_chunked(
        &token,
        "books",
        &documents(30),
        10,
        usize::MAX,
    ))
    .await
    .unwrap();

    assert_eq!(summary.submitted, 30);
    assert_eq!(sink.opened(), 3);
    assert_eq!(sink.closed(), 3);
}

#[tokio::test]
async fn test_oversized_worker_queue_is_clamped() {
    let sink = MockSink::new();
    let config = DispatcherConfig {
        queue_depth_per_worker: usize::MAX,
        ..DispatcherConfig::default()
    };
    let dispatcher = BulkDispatcher::with_config(Arc::new(sink.clone()), config);
    let token = CancellationToken::new();

    let summary = within_timeout(dispatcher.dispatch_worker_pool(
        &token,
        "books",
        &documents(20),
        2,
    ))
    .await
    .unwrap();

    assert_eq!(summary.submitted, 20);
    assert_eq!(sink.written(), (1..=20).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_worker_pool_empty_batch_closes_one_session() {
    let sink = MockSink::new();
    let token = CancellationToken::new();

    let summary = within_timeout(dispatcher(&sink).dispatch_worker_pool(
        &token,
        "books",
        &DocumentBatch::<Document>::empty(),
        4,
    ))
    .await
    .unwrap();

    assert_eq!(summary.sessions, 1);
    assert_eq!(summary.submitted, 0);
    assert_eq!(sink.opened(), 1);
    assert_eq!(sink.closed(), 1);
}

#[tokio::test]
async fn test_empty_batch_under_every_strategy() {
    let strategies = [
        (DispatchStrategy::Sequential, 0),
        (DispatchStrategy::Bulk, 0),
        (
            DispatchStrategy::Chunked {
                chunk_size: 10,
                max_concurrency: 2,
            },
            0,
        ),
        (DispatchStrategy::WorkerPool { workers: 2 }, 1),
    ];

    for (strategy, expected_sessions) in strategies {
        let sink = MockSink::new();
        let token = CancellationToken::new();

        let summary = within_timeout(dispatcher(&sink).dispatch(
            &token,
            "books",
            &DocumentBatch::<Document>::empty(),
            strategy,
        ))
        .await
        .unwrap();

        assert_eq!(summary.documents, 0, "{}", strategy);
        assert_eq!(summary.sessions, expected_sessions, "{}", strategy);
        assert_eq!(sink.opened(), expected_sessions, "{}", strategy);
        assert_eq!(sink.closed(), sink.opened(), "{}", strategy);
        assert!(sink.written().is_empty());
    }
}

#[tokio::test]
async fn test_invalid_parameters_fail_before_any_session() {
    let sink = MockSink::new();
    let dispatcher = dispatcher(&sink);
    let token = CancellationToken::new();
    let batch = documents(10);

    let results = vec![
        dispatcher.dispatch_chunked(&token, "books", &batch, 0, 4).await,
        dispatcher.dispatch_chunked(&token, "books", &batch, 5, 0).await,
        dispatcher.dispatch_worker_pool(&token, "books", &batch, 0).await,
    ];

    for result in results {
        assert!(matches!(result, Err(DispatchError::InvalidParameter(_))));
    }
    assert_eq!(sink.opened(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_writes_every_document_once() {
    let sink = MockSink::new();
    let token = CancellationToken::new();

    let summary = within_timeout(dispatcher(&sink).dispatch_worker_pool(
        &token,
        "books",
        &documents(500),
        4,
    ))
    .await
    .unwrap();

    assert_eq!(summary.submitted, 500);
    assert_eq!(summary.units, 4);
    assert_eq!(sink.written(), (1..=500).collect::<Vec<_>>());
    assert_eq!(sink.closed(), 1);
    assert_eq!(
        sink.first_options(),
        SessionOptions::buffered().with_workers(4)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_keeps_writing_after_a_write_failure() {
    let sink = MockSink::failing_on(5);
    let token = CancellationToken::new();

    let error = within_timeout(dispatcher(&sink).dispatch_worker_pool(
        &token,
        "books",
        &documents(50),
        3,
    ))
    .await
    .unwrap_err();

    assert!(matches!(error, DispatchError::Aggregate { .. }));
    assert_eq!(error.ordinal(), Some(5));
    assert_eq!(sink.written().len(), 49);
    assert_eq!(sink.closed(), 1);
}

#[tokio::test]
async fn test_worker_pool_surfaces_flush_failure() {
    let sink = MockSink::failing_close();
    let token = CancellationToken::new();

    let error = within_timeout(dispatcher(&sink).dispatch_worker_pool(
        &token,
        "books",
        &documents(10),
        2,
    ))
    .await
    .unwrap_err();

    assert!(matches!(error.root(), DispatchError::Flush(_)));
    assert_eq!(sink.closed(), 1);
}

/// Value whose serialization fails for multiples of 4.
struct Flaky(u64);

impl Serialize for Flaky {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 % 4 == 0 {
            return Err(serde::ser::Error::custom("unsupported value"));
        }
        json!({ "n": self.0 }).serialize(serializer)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_skips_documents_that_fail_to_serialize() {
    let sink = MockSink::new();
    let errors = Arc::new(CollectingErrorSink::new());
    let dispatcher = dispatcher(&sink).with_error_sink(errors.clone());
    let token = CancellationToken::new();
    let batch: DocumentBatch<Flaky> = (1..=10).map(Flaky).collect();

    let summary = within_timeout(dispatcher.dispatch_worker_pool(&token, "books", &batch, 3))
        .await
        .unwrap();

    assert_eq!(summary.serialization_failures, 2);
    assert_eq!(summary.submitted, 8);
    assert_eq!(sink.written(), vec![1, 2, 3, 5, 6, 7, 9, 10]);

    let mut ordinals: Vec<usize> = errors.errors().iter().filter_map(|e| e.ordinal()).collect();
    ordinals.sort_unstable();
    assert_eq!(ordinals, vec![4, 8]);
}

#[tokio::test]
async fn test_serialization_failure_is_fatal_for_sequential() {
    let sink = MockSink::new();
    let token = CancellationToken::new();
    let batch: DocumentBatch<Flaky> = (1..=6).map(Flaky).collect();

    let error = within_timeout(dispatcher(&sink).dispatch_sequential(&token, "books", &batch))
        .await
        .unwrap_err();

    assert!(matches!(error, DispatchError::Serialization { ordinal: 4, .. }));
    assert_eq!(sink.written(), vec![1, 2, 3]);
    assert_eq!(sink.closed(), 1);
}

async fn assert_cancels_promptly(strategy: DispatchStrategy) {
    let sink = MockSink::slow(Duration::from_millis(50));
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let result = within_timeout(dispatcher(&sink).dispatch(
        &token,
        "books",
        &documents(1000),
        strategy,
    ))
    .await;

    assert_eq!(result.unwrap_err(), DispatchError::Cancelled, "{}", strategy);
    assert!(started.elapsed() < Duration::from_secs(2), "{}", strategy);
    assert!(sink.written().len() < 1000, "{}", strategy);
    assert_eq!(sink.closed(), sink.opened(), "{}", strategy);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancellation_closes_sessions_promptly() {
    assert_cancels_promptly(DispatchStrategy::Sequential).await;
    assert_cancels_promptly(DispatchStrategy::Bulk).await;
    assert_cancels_promptly(DispatchStrategy::Chunked {
        chunk_size: 100,
        max_concurrency: 2,
    })
    .await;
    assert_cancels_promptly(DispatchStrategy::WorkerPool { workers: 4 }).await;
}

#[tokio::test]
async fn test_already_cancelled_dispatch_opens_nothing() {
    let sink = MockSink::new();
    let token = CancellationToken::new();
    token.cancel();

    let result = dispatcher(&sink)
        .dispatch_sequential(&token, "books", &documents(3))
        .await;

    assert_eq!(result.unwrap_err(), DispatchError::Cancelled);
    assert_eq!(sink.opened(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_memory_sink_end_to_end() {
    let sink = InMemorySink::new();
    let dispatcher = BulkDispatcher::new(Arc::new(sink.clone()));
    let token = CancellationToken::new();

    within_timeout(dispatcher.dispatch_sequential(&token, "sequential", &documents(5)))
        .await
        .unwrap();
    within_timeout(dispatcher.dispatch_bulk(&token, "bulk", &documents(7)))
        .await
        .unwrap();
    within_timeout(dispatcher.dispatch_chunked(&token, "chunked", &documents(250), 100, 2))
        .await
        .unwrap();
    let summary = within_timeout(dispatcher.dispatch_worker_pool(
        &token,
        "pool",
        &documents(100),
        4,
    ))
    .await
    .unwrap();

    let ids: Vec<String> = sink.documents("sequential").into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
    let ids: Vec<String> = sink.documents("bulk").into_iter().map(|d| d.id).collect();
    assert_eq!(ids, (1..=7).map(|n| n.to_string()).collect::<Vec<_>>());
    assert_eq!(sink.document_count("chunked"), 250);
    assert_eq!(sink.document_count("pool"), 100);
    assert_eq!(summary.sink_stats.num_flushed, 100);
    assert_eq!(sink.sessions_opened(), 1 + 1 + 3 + 1);
    assert_eq!(sink.sessions_closed(), sink.sessions_opened());
}
