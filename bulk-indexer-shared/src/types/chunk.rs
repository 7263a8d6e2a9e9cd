//! Chunk type for the bulk indexer.

use std::ops::Range;

/// A contiguous, non-overlapping slice of a document batch.
///
/// Chunks are produced by the dispatcher's partitioner. `range` is half-open
/// and indexes into the batch (0-based); ordinals exposed to callers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk in the partition, starting at 0.
    pub index: usize,
    /// Half-open range of batch positions covered by this chunk.
    pub range: Range<usize>,
}

impl Chunk {
    /// Create a chunk covering `range`.
    pub fn new(index: usize, range: Range<usize>) -> Self {
        Self { index, range }
    }

    /// Number of documents in the chunk.
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// Whether the chunk holds no documents.
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// 1-based ordinal of the first document in the chunk.
    pub fn first_ordinal(&self) -> usize {
        self.range.start + 1
    }

    /// 1-based ordinal of the last document in the chunk.
    pub fn last_ordinal(&self) -> usize {
        self.range.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ordinals() {
        let chunk = Chunk::new(2, 200..300);

        assert_eq!(chunk.len(), 100);
        assert!(!chunk.is_empty());
        assert_eq!(chunk.first_ordinal(), 201);
        assert_eq!(chunk.last_ordinal(), 300);
    }

    #[test]
    fn test_empty_chunk() {
        let chunk = Chunk::new(0, 0..0);
        assert!(chunk.is_empty());
        assert_eq!(chunk.len(), 0);
    }
}
