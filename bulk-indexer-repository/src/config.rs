//! Configuration types for bulk write sinks.

use std::time::Duration;

/// Default number of documents a flush worker buffers before sending a bulk request.
pub const DEFAULT_FLUSH_DOCUMENTS: usize = 1000;

/// Default interval after which a partially filled buffer is flushed.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration shared by every session a sink opens.
///
/// Controls the sink's internal concurrency and how eagerly buffered writes
/// are sent to the backend. Sessions may override the worker count through
/// `SessionOptions`.
#[derive(Debug, Clone)]
pub struct BulkSinkConfig {
    /// Number of flush workers per buffered session.
    ///
    /// Defaults to the available parallelism of the host.
    pub num_workers: usize,
    /// Number of documents buffered per worker before a bulk request is sent.
    pub flush_documents: usize,
    /// Maximum time a partially filled buffer waits before being flushed.
    pub flush_interval: Duration,
    /// Capacity of the queue between `write_one` callers and flush workers.
    pub queue_capacity: usize,
}

impl Default for BulkSinkConfig {
    fn default() -> Self {
        let num_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            num_workers,
            flush_documents: DEFAULT_FLUSH_DOCUMENTS,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            queue_capacity: DEFAULT_FLUSH_DOCUMENTS,
        }
    }
}

impl BulkSinkConfig {
    /// Set the default number of flush workers.
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    /// Set the number of documents buffered before a flush.
    pub fn with_flush_documents(mut self, flush_documents: usize) -> Self {
        self.flush_documents = flush_documents.max(1);
        self
    }

    /// Set the interval after which partial buffers are flushed.
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Resolve the worker count for a session, falling back to the configured default.
    pub fn workers_for(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.num_workers).max(1)
    }
}
