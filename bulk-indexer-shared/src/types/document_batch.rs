//! Document batch type for the bulk indexer.
//!
//! A batch is built by the caller before dispatch and is read-only afterwards.
//! Documents live behind a shared slice so that concurrent units of work can
//! read them without copying.

use std::ops::Range;
use std::sync::Arc;

use crate::types::document::Document;

/// An ordered, immutable collection of documents.
///
/// Order defines both chunk boundaries and the default write identifier of
/// each document (its 1-based position). Cloning a batch is cheap.
///
/// # Example
///
/// ```
/// use bulk_indexer_shared::{Document, DocumentBatch};
/// use serde_json::json;
///
/// let mut doc = Document::new();
/// doc.insert("title".to_string(), json!("Test Document 1"));
///
/// let batch = DocumentBatch::new(vec![doc]);
/// assert_eq!(batch.len(), 1);
/// assert_eq!(DocumentBatch::<Document>::write_id(1), "1");
/// ```
#[derive(Debug)]
pub struct DocumentBatch<T = Document> {
    documents: Arc<[T]>,
}

impl<T> Clone for DocumentBatch<T> {
    fn clone(&self) -> Self {
        Self {
            documents: Arc::clone(&self.documents),
        }
    }
}

impl<T> DocumentBatch<T> {
    /// Create a batch from an ordered list of documents.
    pub fn new(documents: Vec<T>) -> Self {
        Self {
            documents: documents.into(),
        }
    }

    /// Create an empty batch.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of documents in the batch.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the batch holds no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Document at the given 0-based position.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.documents.get(index)
    }

    /// Documents covered by a half-open range of positions.
    ///
    /// Returns `None` if the range falls outside the batch.
    pub fn slice(&self, range: Range<usize>) -> Option<&[T]> {
        self.documents.get(range)
    }

    /// Iterate over the documents in order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.documents.iter()
    }

    /// Deterministic write identifier for the document at a 1-based ordinal.
    pub fn write_id(ordinal: usize) -> String {
        ordinal.to_string()
    }
}

impl<T> From<Vec<T>> for DocumentBatch<T> {
    fn from(documents: Vec<T>) -> Self {
        Self::new(documents)
    }
}

impl<T> FromIterator<T> for DocumentBatch<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a, T> IntoIterator for &'a DocumentBatch<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
