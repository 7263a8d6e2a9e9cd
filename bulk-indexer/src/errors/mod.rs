//! Error types for the bulk ingestion dispatcher.

use bulk_indexer_repository::SinkError;
use thiserror::Error;

/// Errors surfaced by a dispatch call.
///
/// The concurrent strategies wrap the first error they observe in
/// [`DispatchError::Aggregate`], naming the unit of work it came from. The
/// sequential strategy returns the underlying error as is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// A dispatch parameter was rejected before any session was opened.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A document could not be encoded.
    #[error("Failed to serialize document {ordinal}: {message}")]
    Serialization { ordinal: usize, message: String },

    /// The sink rejected a write.
    #[error("Failed to insert document {ordinal}: {source}")]
    Write {
        ordinal: usize,
        #[source]
        source: SinkError,
    },

    /// The sink failed to flush buffered writes when the session was closed.
    #[error("Flush error: {0}")]
    Flush(#[source] SinkError),

    /// A sink session could not be opened.
    #[error("Session error: {0}")]
    Session(#[source] SinkError),

    /// The dispatch was cancelled.
    #[error("Dispatch cancelled")]
    Cancelled,

    /// A unit of work panicked or was aborted.
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// First error observed across concurrently running units of work.
    #[error("Error occurred during concurrent bulk insert in {unit}: {source}")]
    Aggregate {
        unit: String,
        #[source]
        source: Box<DispatchError>,
    },
}

impl DispatchError {
    /// Create an invalid parameter error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a serialization error for the document at `ordinal`.
    pub fn serialization(ordinal: usize, msg: impl Into<String>) -> Self {
        Self::Serialization {
            ordinal,
            message: msg.into(),
        }
    }

    /// Map a failed `write_one` for the document at `ordinal`.
    pub fn write(ordinal: usize, source: SinkError) -> Self {
        if source.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Write { ordinal, source }
        }
    }

    /// Map a failed session close.
    pub fn flush(source: SinkError) -> Self {
        if source.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Flush(source)
        }
    }

    /// Map a failed session open.
    pub fn session(source: SinkError) -> Self {
        if source.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Session(source)
        }
    }

    /// Create a task failure error.
    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }

    /// Wrap an error with the unit of work it was observed in.
    pub fn aggregate(unit: impl Into<String>, source: DispatchError) -> Self {
        Self::Aggregate {
            unit: unit.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through any aggregate wrapping.
    pub fn root(&self) -> &DispatchError {
        match self {
            Self::Aggregate { source, .. } => source.root(),
            other => other,
        }
    }

    /// 1-based ordinal of the failing document, if the error concerns one.
    pub fn ordinal(&self) -> Option<usize> {
        match self.root() {
            Self::Serialization { ordinal, .. } | Self::Write { ordinal, .. } => Some(*ordinal),
            _ => None,
        }
    }

    /// Whether the error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }
}
