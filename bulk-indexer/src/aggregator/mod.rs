//! Completion aggregation for dispatch calls.
//!
//! Concurrent units of work report failures into a [`FirstErrorCell`]. The
//! first error recorded wins; later ones are counted, logged and forwarded to
//! the optional [`ErrorSink`], but never surfaced as the call's result.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use bulk_indexer_repository::SessionStats;
use tracing::warn;

use crate::errors::DispatchError;

/// Receives every error a dispatch call observes, including those it does not return.
pub trait ErrorSink: Send + Sync {
    /// Record one observed error.
    fn record(&self, error: &DispatchError);
}

/// Error sink that keeps every error in memory.
#[derive(Debug, Default)]
pub struct CollectingErrorSink {
    errors: Mutex<Vec<DispatchError>>,
}

impl CollectingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors recorded so far, in observation order.
    pub fn errors(&self) -> Vec<DispatchError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorSink for CollectingErrorSink {
    fn record(&self, error: &DispatchError) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error.clone());
    }
}

/// Single-slot "first error wins" cell shared by concurrent units of work.
///
/// Recording never blocks on a reader.
#[derive(Default)]
pub struct FirstErrorCell {
    first: OnceLock<DispatchError>,
    suppressed: AtomicUsize,
    error_sink: Option<Arc<dyn ErrorSink>>,
}

impl FirstErrorCell {
    pub fn new(error_sink: Option<Arc<dyn ErrorSink>>) -> Self {
        Self {
            first: OnceLock::new(),
            suppressed: AtomicUsize::new(0),
            error_sink,
        }
    }

    /// Record an error. Returns `true` if it became the surfaced error.
    pub fn record(&self, error: DispatchError) -> bool {
        self.forward(&error);
        match self.first.set(error) {
            Ok(()) => true,
            Err(discarded) => {
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %discarded, "Discarding error, an earlier failure is already recorded");
                false
            }
        }
    }

    /// Forward an error to the error sink without making it a candidate result.
    pub fn forward(&self, error: &DispatchError) {
        if let Some(sink) = &self.error_sink {
            sink.record(error);
        }
    }

    /// The surfaced error, if any was recorded.
    pub fn first(&self) -> Option<DispatchError> {
        self.first.get().cloned()
    }

    /// Number of errors recorded after the first one.
    pub fn suppressed(&self) -> usize {
        self.suppressed.load(Ordering::Relaxed)
    }
}

/// Outcome of a successful dispatch call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Name of the strategy that ran.
    pub strategy: &'static str,
    /// Length of the dispatched batch.
    pub documents: usize,
    /// Documents accepted by a sink session.
    pub submitted: usize,
    /// Units of work launched (chunks, or workers for the pool).
    pub units: usize,
    /// Sink sessions opened; every one of them was closed.
    pub sessions: usize,
    /// Documents skipped because they could not be encoded.
    pub serialization_failures: usize,
    /// Statistics summed over every closed session.
    pub sink_stats: SessionStats,
}
