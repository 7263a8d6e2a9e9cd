//! This module defines the core data structures used across the bulk indexer.
//! It re-exports `Document`, `DocumentBatch` and `Chunk`.

pub mod chunk;
pub mod document;
pub mod document_batch;

pub use chunk::Chunk;
pub use document::Document;
pub use document_batch::DocumentBatch;
