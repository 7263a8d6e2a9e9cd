//! OpenSearch implementation of the bulk write sink.
//!
//! This module provides a concrete implementation of `BulkWriteSink` using the
//! OpenSearch `_bulk` API, plus index administration helpers.

mod bulk;
mod index_config;
mod provider;
mod session;

pub use index_config::IndexConfig;
pub use provider::OpenSearchSink;
pub use session::OpenSearchSession;
