use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bulk_indexer_repository::{SessionOptions, SinkSession};
use bulk_indexer_shared::DocumentBatch;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::{encode, require_positive, write_document, BulkDispatcher, DispatchStrategy};
use crate::aggregator::{DispatchSummary, FirstErrorCell};
use crate::errors::DispatchError;

type DocumentQueue = Arc<Mutex<mpsc::Receiver<usize>>>;

/// State shared by the pool's workers.
struct Pool<T> {
    session: Arc<dyn SinkSession>,
    batch: DocumentBatch<T>,
    queue: DocumentQueue,
    errors: FirstErrorCell,
    submitted: AtomicUsize,
    serialization_failures: AtomicUsize,
    cancellation: CancellationToken,
}

impl BulkDispatcher {
    /// Write the batch through `workers` units sharing one buffered session.
    ///
    /// A producer enqueues the position of every document exactly once; each
    /// worker takes the next position from the shared queue and writes that
    /// document, until the queue is exhausted and closed. The session is
    /// closed after every worker has finished, so all buffered writes are
    /// flushed or failed before the call returns. Documents that cannot be
    /// encoded are skipped and counted without stopping the pool. A write
    /// failure is recorded and the remaining documents are still written; the
    /// call then fails with the first one. Write order is not preserved.
    ///
    /// # Returns
    ///
    /// * `Ok(DispatchSummary)` - No write or flush failure was recorded
    /// * `Err(DispatchError::InvalidParameter)` - `workers` is 0
    /// * `Err(DispatchError::Aggregate)` - The first write or flush failure observed
    /// * `Err(DispatchError::Cancelled)` - The call was cancelled
    #[instrument(
        skip(self, cancellation, target, batch),
        fields(index = %target, documents = batch.len())
    )]
    pub async fn dispatch_worker_pool<T>(
        &self,
        cancellation: &CancellationToken,
        target: &str,
        batch: &DocumentBatch<T>,
        workers: usize,
    ) -> Result<DispatchSummary, DispatchError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        require_positive("worker count", workers)?;

        let mut options = SessionOptions::buffered();
        if self.config.forward_workers_to_sink {
            options = options.with_workers(workers);
        }
        info!(workers, "Starting worker pool dispatch");
        let session: Arc<dyn SinkSession> =
            Arc::from(self.open_session(target, options, cancellation).await?);

        let capacity = workers
            .saturating_mul(self.config.queue_depth_per_worker.max(1))
            .min(Semaphore::MAX_PERMITS);
        let (sender, receiver) = mpsc::channel(capacity);
        let pool = Arc::new(Pool {
            session: Arc::clone(&session),
            batch: batch.clone(),
            queue: Arc::new(Mutex::new(receiver)),
            errors: FirstErrorCell::new(self.error_sink.clone()),
            submitted: AtomicUsize::new(0),
            serialization_failures: AtomicUsize::new(0),
            cancellation: cancellation.clone(),
        });

        let producer = tokio::spawn(produce(sender, batch.len(), cancellation.clone()));
        let mut tasks = JoinSet::new();
        for worker in 0..workers {
            tasks.spawn(run_worker(worker, Arc::clone(&pool)));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(join_error) = joined {
                pool.errors.record(DispatchError::aggregate(
                    "worker",
                    DispatchError::task_failed(join_error.to_string()),
                ));
            }
        }
        pool.queue.lock().await.close();
        if let Err(join_error) = producer.await {
            pool.errors.record(DispatchError::aggregate(
                "producer",
                DispatchError::task_failed(join_error.to_string()),
            ));
        }

        let closed = session.close().await;
        let mut summary = DispatchSummary {
            strategy: DispatchStrategy::WorkerPool { workers }.name(),
            documents: batch.len(),
            submitted: pool.submitted.load(Ordering::SeqCst),
            units: workers,
            sessions: 1,
            serialization_failures: pool.serialization_failures.load(Ordering::SeqCst),
            ..Default::default()
        };
        match closed {
            Ok(stats) => summary.sink_stats = stats,
            Err(e) => {
                pool.errors
                    .record(DispatchError::aggregate("session close", DispatchError::flush(e)));
            }
        }

        if cancellation.is_cancelled() {
            warn!(submitted = summary.submitted, "Worker pool dispatch cancelled");
            return Err(DispatchError::Cancelled);
        }
        if let Some(e) = pool.errors.first() {
            error!(
                error = %e,
                discarded_errors = pool.errors.suppressed(),
                "Worker pool dispatch failed"
            );
            return Err(e);
        }

        info!(
            submitted = summary.submitted,
            skipped = summary.serialization_failures,
            "Worker pool dispatch completed"
        );
        Ok(summary)
    }
}

/// Enqueue every position in `0..len`, then close the queue by dropping the sender.
async fn produce(sender: mpsc::Sender<usize>, len: usize, cancellation: CancellationToken) {
    for index in 0..len {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => break,
            sent = sender.send(index) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

async fn next_position(queue: &DocumentQueue, cancellation: &CancellationToken) -> Option<usize> {
    let mut receiver = queue.lock().await;
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => None,
        position = receiver.recv() => position,
    }
}

async fn run_worker<T>(worker: usize, pool: Arc<Pool<T>>)
where
    T: Serialize + Send + Sync + 'static,
{
    let mut written = 0usize;
    while let Some(index) = next_position(&pool.queue, &pool.cancellation).await {
        let ordinal = index + 1;
        let Some(document) = pool.batch.get(index) else {
            continue;
        };

        let value = match encode(document, ordinal) {
            Ok(value) => value,
            Err(e) => {
                pool.serialization_failures.fetch_add(1, Ordering::SeqCst);
                warn!(worker, ordinal, error = %e, "Skipping document that failed to serialize");
                pool.errors.forward(&e);
                continue;
            }
        };

        match write_document(
            pool.session.as_ref(),
            None,
            value,
            ordinal,
            &pool.cancellation,
        )
        .await
        {
            Ok(()) => {
                pool.submitted.fetch_add(1, Ordering::SeqCst);
                written += 1;
            }
            Err(DispatchError::Cancelled) => break,
            Err(e) => {
                pool.errors
                    .record(DispatchError::aggregate(format!("worker {}", worker), e));
            }
        }
    }
    debug!(worker, written, "Worker finished");
}
