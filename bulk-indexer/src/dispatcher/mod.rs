//! Bulk ingestion dispatcher.
//!
//! The dispatcher takes an ordered [`DocumentBatch`] and drives it through one
//! or more sessions of a [`BulkWriteSink`] using one of four strategies:
//!
//! - **Sequential**: one immediate session, documents written in batch order
//!   with their ordinal as write identifier, stopping at the first failure.
//! - **Bulk**: the same ordered, fail-fast walk through one buffered session,
//!   leaving batching to the sink.
//! - **Chunked**: one unit of work per fixed-size chunk, each with its own
//!   buffered session, at most `max_concurrency` units running at once.
//! - **Worker pool**: `workers` units draining a shared queue of documents
//!   into a single buffered session.
//!
//! Only the sequential strategy preserves write order at the backend. Every session a call
//! opens is closed before the call returns, on success, failure and
//! cancellation alike.

mod bulk;
mod chunked;
mod sequential;
mod worker_pool;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bulk_indexer_repository::{BulkWriteSink, SessionOptions, SinkSession};
use bulk_indexer_shared::DocumentBatch;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::aggregator::{DispatchSummary, ErrorSink};
use crate::errors::DispatchError;

/// Strategy and strategy-specific parameters for a dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStrategy {
    /// Write one document at a time, in order, failing fast.
    Sequential,
    /// Enqueue every document, in order, into one buffered session.
    Bulk,
    /// One unit of work per chunk of `chunk_size` documents.
    Chunked {
        chunk_size: usize,
        max_concurrency: usize,
    },
    /// `workers` units sharing one session and one document queue.
    WorkerPool { workers: usize },
}

impl DispatchStrategy {
    /// Short name used in logs and summaries.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Bulk => "bulk",
            Self::Chunked { .. } => "chunked",
            Self::WorkerPool { .. } => "worker-pool",
        }
    }
}

impl fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Strategy kind without parameters, as selected from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Sequential,
    Bulk,
    Chunked,
    WorkerPool,
}

impl FromStr for StrategyKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" | "single" => Ok(Self::Sequential),
            "bulk" => Ok(Self::Bulk),
            "chunked" | "concurrent" => Ok(Self::Chunked),
            "worker-pool" | "worker_pool" | "workerpool" | "pool" => Ok(Self::WorkerPool),
            other => Err(DispatchError::invalid_parameter(format!(
                "unknown dispatch strategy '{}'",
                other
            ))),
        }
    }
}

/// Configuration shared by every dispatch call of a [`BulkDispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Worker-pool queue capacity, as a multiple of the worker count.
    pub queue_depth_per_worker: usize,
    /// Whether the worker-pool worker count is also used as the session's
    /// internal flush worker count.
    pub forward_workers_to_sink: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_depth_per_worker: 1,
            forward_workers_to_sink: true,
        }
    }
}

/// Drives document batches into a bulk write sink.
///
/// Built once and shared; holds no per-call state.
#[derive(Clone)]
pub struct BulkDispatcher {
    sink: Arc<dyn BulkWriteSink>,
    config: DispatcherConfig,
    error_sink: Option<Arc<dyn ErrorSink>>,
}

impl BulkDispatcher {
    /// Create a dispatcher with the default configuration.
    pub fn new(sink: Arc<dyn BulkWriteSink>) -> Self {
        Self::with_config(sink, DispatcherConfig::default())
    }

    /// Create a dispatcher with a custom configuration.
    pub fn with_config(sink: Arc<dyn BulkWriteSink>, config: DispatcherConfig) -> Self {
        Self {
            sink,
            config,
            error_sink: None,
        }
    }

    /// Forward every observed error, including discarded ones, to `error_sink`.
    pub fn with_error_sink(mut self, error_sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(error_sink);
        self
    }

    /// Dispatch `batch` into `target` with the given strategy.
    pub async fn dispatch<T>(
        &self,
        cancellation: &CancellationToken,
        target: &str,
        batch: &DocumentBatch<T>,
        strategy: DispatchStrategy,
    ) -> Result<DispatchSummary, DispatchError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        match strategy {
            DispatchStrategy::Sequential => {
                self.dispatch_sequential(cancellation, target, batch).await
            }
            DispatchStrategy::Bulk => self.dispatch_bulk(cancellation, target, batch).await,
            DispatchStrategy::Chunked {
                chunk_size,
                max_concurrency,
            } => {
                self.dispatch_chunked(cancellation, target, batch, chunk_size, max_concurrency)
                    .await
            }
            DispatchStrategy::WorkerPool { workers } => {
                self.dispatch_worker_pool(cancellation, target, batch, workers)
                    .await
            }
        }
    }

    async fn open_session(
        &self,
        target: &str,
        options: SessionOptions,
        cancellation: &CancellationToken,
    ) -> Result<Box<dyn SinkSession>, DispatchError> {
        if cancellation.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        debug!(index = %target, mode = ?options.mode, "Opening sink session");
        self.sink
            .open(target, options, cancellation.clone())
            .await
            .map_err(DispatchError::session)
    }
}

/// Encode one document for the sink.
fn encode<T: Serialize>(document: &T, ordinal: usize) -> Result<Value, DispatchError> {
    serde_json::to_value(document).map_err(|e| DispatchError::serialization(ordinal, e.to_string()))
}

/// Write one document, giving up as soon as `cancellation` fires.
async fn write_document(
    session: &dyn SinkSession,
    id: Option<String>,
    document: Value,
    ordinal: usize,
    cancellation: &CancellationToken,
) -> Result<(), DispatchError> {
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(DispatchError::Cancelled),
        result = session.write_one(id, document) => {
            result.map_err(|e| DispatchError::write(ordinal, e))
        }
    }
}

fn require_positive(name: &str, value: usize) -> Result<(), DispatchError> {
    if value == 0 {
        return Err(DispatchError::invalid_parameter(format!(
            "{} must be greater than 0",
            name
        )));
    }
    Ok(())
}
