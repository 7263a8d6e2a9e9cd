//! In-memory bulk write sink for testing and local development.
//!
//! The `InMemorySink` stores every document written through its sessions,
//! keyed by target, and counts how many sessions were opened and closed. It
//! follows the same session semantics as the OpenSearch sink: buffered writes
//! only become visible once their session is closed.
//!
//! # Example
//!
//! ```
//! use bulk_indexer_repository::{BulkWriteSink, InMemorySink, SessionOptions};
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), bulk_indexer_repository::SinkError> {
//! let sink = InMemorySink::new();
//! let session = sink
//!     .open("books", SessionOptions::buffered(), CancellationToken::new())
//!     .await?;
//! session.write_one(Some("1".to_string()), json!({"title": "Dune"})).await?;
//! session.close().await?;
//!
//! assert_eq!(sink.document_count("books"), 1);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::SinkError;
use crate::interfaces::{BulkWriteSink, SinkSession};
use crate::types::{SessionOptions, SessionStats, WriteMode};

/// A document stored by the in-memory sink.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Identifier given by the writer, or one assigned by the sink.
    pub id: String,
    /// The document body.
    pub document: Value,
}

#[derive(Debug, Default)]
struct Store {
    documents: RwLock<HashMap<String, Vec<StoredDocument>>>,
    next_id: AtomicU64,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
}

impl Store {
    fn insert(&self, target: &str, documents: Vec<StoredDocument>) {
        let mut store = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        store.entry(target.to_string()).or_default().extend(documents);
    }

    fn assign_id(&self, id: Option<String>) -> String {
        id.unwrap_or_else(|| format!("auto-{}", self.next_id.fetch_add(1, Ordering::Relaxed)))
    }
}

/// Bulk write sink that keeps documents in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySink {
    store: Arc<Store>,
}

impl InMemorySink {
    /// Create a new empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All documents written to `target`, in the order their sessions flushed them.
    pub fn documents(&self, target: &str) -> Vec<StoredDocument> {
        self.store
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of documents written to `target`.
    pub fn document_count(&self, target: &str) -> usize {
        self.store
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .map_or(0, Vec::len)
    }

    /// Number of sessions opened so far.
    pub fn sessions_opened(&self) -> usize {
        self.store.sessions_opened.load(Ordering::SeqCst)
    }

    /// Number of sessions closed so far.
    pub fn sessions_closed(&self) -> usize {
        self.store.sessions_closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BulkWriteSink for InMemorySink {
    async fn open(
        &self,
        target: &str,
        options: SessionOptions,
        cancellation: CancellationToken,
    ) -> Result<Box<dyn SinkSession>, SinkError> {
        self.store.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemorySession {
            store: Arc::clone(&self.store),
            target: target.to_string(),
            mode: options.mode,
            buffer: Mutex::new(Vec::new()),
            stats: Mutex::new(SessionStats::default()),
            closed: AtomicBool::new(false),
            cancellation,
        }))
    }
}

struct InMemorySession {
    store: Arc<Store>,
    target: String,
    mode: WriteMode,
    buffer: Mutex<Vec<StoredDocument>>,
    stats: Mutex<SessionStats>,
    closed: AtomicBool,
    cancellation: CancellationToken,
}

#[async_trait]
impl SinkSession for InMemorySession {
    async fn write_one(&self, id: Option<String>, document: Value) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::session_closed(&self.target));
        }
        if self.cancellation.is_cancelled() {
            return Err(SinkError::Cancelled);
        }

        let stored = StoredDocument {
            id: self.store.assign_id(id),
            document,
        };
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.num_added += 1;
        match self.mode {
            WriteMode::Immediate => {
                stats.num_flushed += 1;
                stats.num_requests += 1;
                self.store.insert(&self.target, vec![stored]);
            }
            WriteMode::Buffered => self
                .buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(stored),
        }
        Ok(())
    }

    async fn close(&self) -> Result<SessionStats, SinkError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(*self.stats.lock().unwrap_or_else(PoisonError::into_inner));
        }
        self.store.sessions_closed.fetch_add(1, Ordering::SeqCst);

        let pending = std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner));
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);

        if self.cancellation.is_cancelled() {
            stats.num_failed += pending.len() as u64;
            return Err(SinkError::Cancelled);
        }

        if !pending.is_empty() {
            stats.num_flushed += pending.len() as u64;
            stats.num_requests += 1;
            self.store.insert(&self.target, pending);
        }
        Ok(*stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_buffered_writes_visible_after_close() {
        let sink = InMemorySink::new();
        let session = sink
            .open("books", SessionOptions::buffered(), CancellationToken::new())
            .await
            .unwrap();

        session.write_one(None, json!({"title": "a"})).await.unwrap();
        session.write_one(None, json!({"title": "b"})).await.unwrap();
        assert_eq!(sink.document_count("books"), 0);

        let stats = session.close().await.unwrap();
        assert_eq!(sink.document_count("books"), 2);
        assert_eq!(stats.num_added, 2);
        assert_eq!(stats.num_flushed, 2);
        assert_eq!(stats.num_requests, 1);
    }

    #[tokio::test]
    async fn test_immediate_writes_keep_ids() {
        let sink = InMemorySink::new();
        let session = sink
            .open("books", SessionOptions::immediate(), CancellationToken::new())
            .await
            .unwrap();

        session
            .write_one(Some("1".to_string()), json!({"title": "a"}))
            .await
            .unwrap();
        assert_eq!(sink.documents("books")[0].id, "1");

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_session_counters_and_double_close() {
        let sink = InMemorySink::new();
        let session = sink
            .open("books", SessionOptions::buffered(), CancellationToken::new())
            .await
            .unwrap();

        session.close().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(sink.sessions_opened(), 1);
        assert_eq!(sink.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let sink = InMemorySink::new();
        let session = sink
            .open("books", SessionOptions::buffered(), CancellationToken::new())
            .await
            .unwrap();
        session.close().await.unwrap();

        let result = session.write_one(None, json!({})).await;
        assert!(matches!(result, Err(SinkError::SessionClosed(_))));
    }

    #[tokio::test]
    async fn test_cancelled_session_drops_buffer() {
        let sink = InMemorySink::new();
        let token = CancellationToken::new();
        let session = sink
            .open("books", SessionOptions::buffered(), token.clone())
            .await
            .unwrap();

        session.write_one(None, json!({"title": "a"})).await.unwrap();
        token.cancel();

        assert!(session.write_one(None, json!({})).await.unwrap_err().is_cancelled());
        assert_eq!(session.close().await.unwrap_err(), SinkError::Cancelled);
        assert_eq!(sink.document_count("books"), 0);
        assert_eq!(sink.sessions_closed(), 1);
    }
}
