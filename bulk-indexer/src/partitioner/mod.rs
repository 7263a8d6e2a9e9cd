//! Chunk partitioner.
//!
//! Splits a batch of `len` documents into contiguous chunks of `chunk_size`
//! positions: `[0, S)`, `[S, 2S)`, ... with only the last chunk possibly
//! shorter. Chunks are produced lazily and in batch order.

use std::iter::FusedIterator;

use bulk_indexer_shared::Chunk;

use crate::errors::DispatchError;

/// Lazy sequence of chunks covering `[0, len)` exactly once.
#[derive(Debug, Clone)]
pub struct Chunks {
    len: usize,
    chunk_size: usize,
    next: usize,
}

/// Partition a batch of `len` documents into chunks of `chunk_size`.
///
/// # Returns
///
/// * `Ok(Chunks)` - `ceil(len / chunk_size)` chunks; none when `len` is 0
/// * `Err(DispatchError::InvalidParameter)` - If `chunk_size` is 0
pub fn partition(len: usize, chunk_size: usize) -> Result<Chunks, DispatchError> {
    if chunk_size == 0 {
        return Err(DispatchError::invalid_parameter(
            "chunk size must be greater than 0",
        ));
    }

    Ok(Chunks {
        len,
        chunk_size,
        next: 0,
    })
}

/// Number of chunks `partition(len, chunk_size)` yields.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        0
    } else {
        len.div_ceil(chunk_size)
    }
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let start = self.next.checked_mul(self.chunk_size)?;
        if start >= self.len {
            return None;
        }
        let end = start.saturating_add(self.chunk_size).min(self.len);
        let chunk = Chunk::new(self.next, start..end);
        self.next += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = chunk_count(self.len, self.chunk_size).saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks {}

impl FusedIterator for Chunks {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let result = partition(10, 0);
        assert!(matches!(result, Err(DispatchError::InvalidParameter(_))));
    }

    #[test]
    fn test_empty_batch_yields_no_chunks() {
        assert_eq!(partition(0, 5).unwrap().count(), 0);
    }

    #[test]
    fn test_last_chunk_is_shorter() {
        let chunks: Vec<Chunk> = partition(10, 4).unwrap().collect();

        assert_eq!(
            chunks,
            vec![Chunk::new(0, 0..4), Chunk::new(1, 4..8), Chunk::new(2, 8..10)]
        );
    }

    #[test]
    fn test_chunks_cover_every_position_once() {
        for len in 0..60 {
            for chunk_size in 1..15 {
                let chunks: Vec<Chunk> = partition(len, chunk_size).unwrap().collect();
                assert_eq!(chunks.len(), len.div_ceil(chunk_size));
                assert_eq!(chunks.len(), chunk_count(len, chunk_size));
                assert!(chunks.iter().all(|c| !c.is_empty()));

                let positions: Vec<usize> = chunks.iter().flat_map(|c| c.range.clone()).collect();
                assert_eq!(positions, (0..len).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_size_hint_tracks_progress() {
        let mut chunks = partition(1000, 100).unwrap();
        assert_eq!(chunks.len(), 10);

        chunks.next();
        chunks.next();
        assert_eq!(chunks.len(), 8);
    }

    #[test]
    fn test_chunk_larger_than_batch() {
        let chunks: Vec<Chunk> = partition(3, 100).unwrap().collect();
        assert_eq!(chunks, vec![Chunk::new(0, 0..3)]);
    }
}
