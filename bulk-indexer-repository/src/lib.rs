//! # Bulk Indexer Repository
//!
//! This crate provides the bulk write sink abstraction used by the dispatcher,
//! together with an OpenSearch implementation backed by the `_bulk` API and an
//! in-memory implementation for tests and dry runs.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod opensearch;
pub mod types;

pub use config::BulkSinkConfig;
pub use errors::SinkError;
pub use interfaces::{BulkWriteSink, SinkSession};
pub use memory::InMemorySink;
pub use opensearch::OpenSearchSink;
pub use types::{SessionOptions, SessionStats, WriteMode};
