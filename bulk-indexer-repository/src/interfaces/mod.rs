//! Interface definitions for bulk write sinks.
//!
//! This module defines the abstract `BulkWriteSink` and `SinkSession` traits
//! that allow the dispatcher to be tested against mocks and pointed at
//! different backends.

mod bulk_write_sink;

pub use bulk_write_sink::{BulkWriteSink, SinkSession};
