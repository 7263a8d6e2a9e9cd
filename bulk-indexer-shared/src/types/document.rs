//! Document type for the bulk indexer.

use serde_json::{Map, Value};

/// A single document to ingest: an opaque mapping from field name to value.
///
/// The schema is the concern of the target index. Within a batch a document is
/// identified by its 1-based ordinal, see [`crate::DocumentBatch::write_id`].
pub type Document = Map<String, Value>;
