//! OpenSearch session implementation.
//!
//! A buffered session owns a bounded queue drained by N flush workers. Each
//! worker accumulates items until `flush_documents` is reached or the flush
//! interval elapses, then sends them as a single `_bulk` request. Closing the
//! session closes the queue and waits for every worker to flush what it holds.
//! An immediate session sends one `index` request per write instead.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use opensearch::{http::request::JsonBody, BulkParts, IndexParts, OpenSearch};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BulkSinkConfig;
use crate::errors::SinkError;
use crate::interfaces::SinkSession;
use crate::opensearch::bulk::{bulk_lines, parse_bulk_response, BulkItem, BulkOutcome};
use crate::types::{SessionOptions, SessionStats, WriteMode};

type SharedQueue = Arc<AsyncMutex<mpsc::Receiver<BulkItem>>>;

#[derive(Debug, Default)]
struct Counters {
    added: AtomicU64,
    flushed: AtomicU64,
    failed: AtomicU64,
    requests: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SessionStats {
        SessionStats {
            num_added: self.added.load(Ordering::Relaxed),
            num_flushed: self.flushed.load(Ordering::Relaxed),
            num_failed: self.failed.load(Ordering::Relaxed),
            num_requests: self.requests.load(Ordering::Relaxed),
        }
    }
}

/// An open write session against one OpenSearch index.
pub struct OpenSearchSession {
    client: OpenSearch,
    target: String,
    mode: WriteMode,
    sender: Mutex<Option<mpsc::Sender<BulkItem>>>,
    queue: Option<SharedQueue>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    flush_error: Arc<OnceLock<SinkError>>,
    closed: AtomicBool,
    cancellation: CancellationToken,
}

impl OpenSearchSession {
    /// Open a session and, in buffered mode, spawn its flush workers.
    pub(crate) fn start(
        client: OpenSearch,
        target: &str,
        options: SessionOptions,
        config: &BulkSinkConfig,
        cancellation: CancellationToken,
    ) -> Self {
        let counters = Arc::new(Counters::default());
        let flush_error = Arc::new(OnceLock::new());

        let (sender, queue, workers) = match options.mode {
            WriteMode::Immediate => (None, None, Vec::new()),
            WriteMode::Buffered => {
                let num_workers = config.workers_for(options.num_workers);
                let capacity = config.queue_capacity.clamp(1, Semaphore::MAX_PERMITS);
                let (sender, receiver) = mpsc::channel(capacity);
                let queue: SharedQueue = Arc::new(AsyncMutex::new(receiver));

                let workers = (0..num_workers)
                    .map(|id| {
                        let worker = FlushWorker {
                            id,
                            client: client.clone(),
                            target: target.to_string(),
                            queue: Arc::clone(&queue),
                            flush_documents: config.flush_documents.max(1),
                            flush_interval: config.flush_interval,
                            counters: Arc::clone(&counters),
                            flush_error: Arc::clone(&flush_error),
                            cancellation: cancellation.clone(),
                        };
                        tokio::spawn(worker.run())
                    })
                    .collect();

                debug!(index = %target, num_workers, "Started buffered session");
                (Some(sender), Some(queue), workers)
            }
        };

        Self {
            client,
            target: target.to_string(),
            mode: options.mode,
            sender: Mutex::new(sender),
            queue,
            workers: Mutex::new(workers),
            counters,
            flush_error,
            closed: AtomicBool::new(false),
            cancellation,
        }
    }

    async fn write_immediate(&self, id: Option<String>, document: Value) -> Result<(), SinkError> {
        let parts = match id.as_deref() {
            Some(id) => IndexParts::IndexId(&self.target, id),
            None => IndexParts::Index(&self.target),
        };

        self.counters.added.fetch_add(1, Ordering::Relaxed);
        self.counters.requests.fetch_add(1, Ordering::Relaxed);

        let request = self.client.index(parts).body(document).send();
        let response = tokio::select! {
            response = request => response.map_err(|e| SinkError::write(e.to_string())),
            _ = self.cancellation.cancelled() => Err(SinkError::Cancelled),
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let status = response.status_code();
        if !status.is_success() {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            let error_body = response.text().await.unwrap_or_default();
            return Err(SinkError::write(format!(
                "Index request failed with status {}: {}",
                status, error_body
            )));
        }

        self.counters.flushed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn write_buffered(&self, id: Option<String>, document: Value) -> Result<(), SinkError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| SinkError::session_closed(&self.target))?;

        tokio::select! {
            sent = sender.send(BulkItem { id, document }) => {
                sent.map_err(|_| SinkError::write("All flush workers have stopped"))?;
            }
            _ = self.cancellation.cancelled() => return Err(SinkError::Cancelled),
        }

        self.counters.added.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl SinkSession for OpenSearchSession {
    async fn write_one(&self, id: Option<String>, document: Value) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::session_closed(&self.target));
        }
        match self.mode {
            WriteMode::Immediate => self.write_immediate(id, document).await,
            WriteMode::Buffered => self.write_buffered(id, document).await,
        }
    }

    async fn close(&self) -> Result<SessionStats, SinkError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(self.counters.snapshot());
        }

        // Dropping the sender closes the queue once in-flight writes finish.
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in workers {
            if let Err(e) = handle.await {
                let _ = self
                    .flush_error
                    .set(SinkError::flush(format!("Flush worker failed: {}", e)));
            }
        }

        // Items left in the queue were never flushed (workers stopped on cancellation).
        if let Some(ref queue) = self.queue {
            let mut receiver = queue.lock().await;
            while receiver.try_recv().is_ok() {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        let stats = self.counters.snapshot();
        info!(
            index = %self.target,
            added = stats.num_added,
            flushed = stats.num_flushed,
            failed = stats.num_failed,
            requests = stats.num_requests,
            "Closed session"
        );

        match self.flush_error.get() {
            Some(e) => Err(e.clone()),
            None => Ok(stats),
        }
    }
}

struct FlushWorker {
    id: usize,
    client: OpenSearch,
    target: String,
    queue: SharedQueue,
    flush_documents: usize,
    flush_interval: Duration,
    counters: Arc<Counters>,
    flush_error: Arc<OnceLock<SinkError>>,
    cancellation: CancellationToken,
}

impl FlushWorker {
    async fn run(self) {
        let mut buffer: Vec<BulkItem> = Vec::with_capacity(self.flush_documents);
        let mut ticker = interval(self.flush_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => {
                    self.abandon(&mut buffer);
                    return;
                }
                item = next_item(&self.queue) => match item {
                    Some(item) => {
                        buffer.push(item);
                        if buffer.len() >= self.flush_documents {
                            self.flush(&mut buffer).await;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer).await;
                    }
                }
            }
        }

        self.flush(&mut buffer).await;
        debug!(worker = self.id, index = %self.target, "Flush worker finished");
    }

    fn abandon(&self, buffer: &mut Vec<BulkItem>) {
        if !buffer.is_empty() {
            warn!(
                worker = self.id,
                count = buffer.len(),
                "Dropping buffered documents on cancellation"
            );
            self.counters
                .failed
                .fetch_add(buffer.len() as u64, Ordering::Relaxed);
            buffer.clear();
        }
        let _ = self.flush_error.set(SinkError::Cancelled);
    }

    async fn flush(&self, buffer: &mut Vec<BulkItem>) {
        if buffer.is_empty() {
            return;
        }

        let items = std::mem::take(buffer);
        let count = items.len();
        self.counters.requests.fetch_add(1, Ordering::Relaxed);

        let result = tokio::select! {
            result = self.send(items) => result,
            _ = self.cancellation.cancelled() => Err(SinkError::Cancelled),
        };

        match result {
            Ok(outcome) => {
                self.counters
                    .flushed
                    .fetch_add(outcome.succeeded, Ordering::Relaxed);
                self.counters
                    .failed
                    .fetch_add(outcome.failed, Ordering::Relaxed);
                if outcome.failed > 0 {
                    warn!(
                        worker = self.id,
                        succeeded = outcome.succeeded,
                        failed = outcome.failed,
                        first_error = ?outcome.first_error,
                        "Bulk request completed with some failures"
                    );
                } else {
                    debug!(worker = self.id, count, "Flushed documents");
                }
            }
            Err(e) => {
                self.counters
                    .failed
                    .fetch_add(count as u64, Ordering::Relaxed);
                error!(worker = self.id, error = %e, count, "Failed to flush documents");
                let _ = self.flush_error.set(e);
            }
        }
    }

    async fn send(&self, items: Vec<BulkItem>) -> Result<BulkOutcome, SinkError> {
        let count = items.len();
        let body: Vec<JsonBody<Value>> = bulk_lines(items).into_iter().map(|l| l.into()).collect();

        let response = self
            .client
            .bulk(BulkParts::Index(&self.target))
            .body(body)
            .send()
            .await
            .map_err(|e| SinkError::flush(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SinkError::flush(format!(
                "Bulk request failed with status {}: {}",
                status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SinkError::parse(e.to_string()))?;
        Ok(parse_bulk_response(&body, count))
    }
}

async fn next_item(queue: &SharedQueue) -> Option<BulkItem> {
    queue.lock().await.recv().await
}
