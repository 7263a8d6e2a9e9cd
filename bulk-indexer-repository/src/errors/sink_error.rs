//! Sink error types.
//!
//! This module defines the error type returned by every bulk write sink and
//! sink session operation.

use thiserror::Error;

/// Errors from bulk write sink operations.
///
/// Used by the `BulkWriteSink` and `SinkSession` traits. Payloads are plain
/// strings so the error stays `Clone` and can be shared between the tasks of a
/// concurrent dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// Failed to establish connection to the backend.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The backend rejected a write.
    #[error("Write error: {0}")]
    WriteError(String),

    /// Buffered writes could not be flushed.
    #[error("Flush error: {0}")]
    FlushError(String),

    /// Failed to create or recreate the target index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// Failed to parse a response from the backend.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The session was already closed when a write arrived.
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// The operation was aborted by cancellation.
    #[error("Operation cancelled")]
    Cancelled,
}

impl SinkError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a write error.
    pub fn write(msg: impl Into<String>) -> Self {
        Self::WriteError(msg.into())
    }

    /// Create a flush error.
    pub fn flush(msg: impl Into<String>) -> Self {
        Self::FlushError(msg.into())
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a session closed error.
    pub fn session_closed(target: &str) -> Self {
        Self::SessionClosed(format!("target={}", target))
    }

    /// Whether this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
