//! # Bulk Indexer
//!
//! Bulk ingestion dispatcher - drives ordered batches of documents into a
//! search index through bulk write sessions.
//!
//! ## Architecture
//!
//! A dispatch call flows through four parts:
//!
//! 1. **Partitioner**: Splits a batch into fixed-size contiguous chunks
//! 2. **Dispatcher**: Distributes documents over sink sessions with one of
//!    four strategies (sequential, bulk, chunked, worker pool)
//! 3. **Aggregator**: Reduces the outcomes of concurrent units of work to a
//!    single result
//! 4. **Sink**: Buffers and flushes writes to the backend
//!    (see `bulk_indexer_repository`)
//!
//! ## Modules
//!
//! - [`config`]: Environment configuration and dependency initialization
//! - [`partitioner`]: Chunk partitioning
//! - [`dispatcher`]: The dispatch strategies
//! - [`aggregator`]: First-error aggregation, error sinks and summaries
//! - [`source`]: Document sources for the binary
//! - [`errors`]: Error types for the dispatcher

pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod partitioner;
pub mod source;

pub use aggregator::{CollectingErrorSink, DispatchSummary, ErrorSink};
pub use config::Dependencies;
pub use dispatcher::{BulkDispatcher, DispatchStrategy, DispatcherConfig};
pub use errors::DispatchError;

use thiserror::Error;

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error loading the documents to ingest.
    #[error("Load error: {0}")]
    LoadError(String),

    /// Dispatch error.
    #[error("Dispatch error: {0}")]
    DispatchError(#[from] DispatchError),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a load error.
    pub fn load(msg: impl Into<String>) -> Self {
        Self::LoadError(msg.into())
    }
}
