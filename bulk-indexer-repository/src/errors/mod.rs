//! Error types for the bulk indexer repository.
//!
//! This module provides a unified error type for all sink operations.

mod sink_error;

pub use sink_error::SinkError;
