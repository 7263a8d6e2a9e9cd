//! # Bulk Indexer Shared
//!
//! This crate defines the data structures shared across the bulk indexer:
//! the documents being ingested, the immutable batch that holds them, and the
//! contiguous chunks a batch is split into for concurrent dispatch.

pub mod types;

pub use types::chunk::Chunk;
pub use types::document::Document;
pub use types::document_batch::DocumentBatch;
