//! Bulk write sink trait definitions.
//!
//! A sink wraps a remote store's batched-write endpoint. Each dispatch call
//! opens one or more sessions on it, writes documents through them, and closes
//! every session it opened, on success and failure paths alike.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::SinkError;
use crate::types::{SessionOptions, SessionStats};

/// Abstracts the batched-write endpoint of a remote store.
///
/// Implementations are injected into the dispatcher as `Arc<dyn BulkWriteSink>`.
/// A sink owns its own buffering, flushing and internal worker concurrency; the
/// dispatcher decides only how documents are distributed across sessions.
#[async_trait]
pub trait BulkWriteSink: Send + Sync {
    /// Open a session writing into `target`.
    ///
    /// # Arguments
    ///
    /// * `target` - The index (or equivalent) that writes go to
    /// * `options` - Write mode and internal worker count for the session
    /// * `cancellation` - Token that aborts in-flight writes and flushes
    ///
    /// # Returns
    ///
    /// * `Ok(Box<dyn SinkSession>)` - An open session; the caller must close it
    /// * `Err(SinkError)` - If the session could not be opened
    async fn open(
        &self,
        target: &str,
        options: SessionOptions,
        cancellation: CancellationToken,
    ) -> Result<Box<dyn SinkSession>, SinkError>;
}

/// One open write channel to a bulk write sink.
///
/// Sessions are shared by reference between concurrent workers, so every
/// method takes `&self` and implementations must be safe for concurrent use.
#[async_trait]
pub trait SinkSession: Send + Sync {
    /// Submit one document.
    ///
    /// In buffered mode a successful return only means the document was
    /// accepted into the session; flush failures surface from [`close`].
    ///
    /// [`close`]: SinkSession::close
    ///
    /// # Arguments
    ///
    /// * `id` - Explicit document identifier, or `None` to let the store assign one
    /// * `document` - The encoded document body
    async fn write_one(&self, id: Option<String>, document: Value) -> Result<(), SinkError>;

    /// Flush everything buffered and release the session.
    ///
    /// # Returns
    ///
    /// * `Ok(SessionStats)` - Counters for everything written through the session
    /// * `Err(SinkError::FlushError)` - If any buffered write could not be flushed
    async fn close(&self) -> Result<SessionStats, SinkError>;
}
