// src/chunk.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-size slicing of a transfer into hardware-legal chunks

use std::iter::FusedIterator;
use std::ops::Range;

use crate::error::{Error, Result};

/// A contiguous byte sub-range of one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferChunk {
    pub offset: usize,
    pub length: usize,
}

impl TransferChunk {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Host-buffer range covered by this chunk
    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }
}

/// Plan for covering `[0, total_size)` in chunks of at most `max_chunk_size`
///
/// The plan is a pair of integers; [`ChunkPlan::iter`] restarts from offset 0
/// on every call, so one plan serves every trial of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_size: usize,
    max_chunk_size: usize,
}

impl ChunkPlan {
    pub fn new(total_size: usize, max_chunk_size: usize) -> Result<Self> {
        if max_chunk_size == 0 {
            return Err(Error::InvalidConfiguration(
                "max chunk size must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            total_size,
            max_chunk_size,
        })
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Number of chunks the plan yields
    pub fn len(&self) -> usize {
        self.total_size.div_ceil(self.max_chunk_size)
    }

    pub fn is_empty(&self) -> bool {
        self.total_size == 0
    }

    pub fn iter(&self) -> Chunks {
        Chunks {
            next_offset: 0,
            total_size: self.total_size,
            max_chunk_size: self.max_chunk_size,
        }
    }
}

impl IntoIterator for &ChunkPlan {
    type Item = TransferChunk;
    type IntoIter = Chunks;

    fn into_iter(self) -> Chunks {
        self.iter()
    }
}

/// Lazy chunk sequence produced by [`ChunkPlan::iter`]
#[derive(Debug, Clone)]
pub struct Chunks {
    next_offset: usize,
    total_size: usize,
    max_chunk_size: usize,
}

impl Iterator for Chunks {
    type Item = TransferChunk;

    #[inline]
    fn next(&mut self) -> Option<TransferChunk> {
        if self.next_offset >= self.total_size {
            return None;
        }
        let offset = self.next_offset;
        let length = (self.total_size - offset).min(self.max_chunk_size);
        self.next_offset += length;
        Some(TransferChunk { offset, length })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total_size - self.next_offset.min(self.total_size))
            .div_ceil(self.max_chunk_size);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Chunks {}

impl FusedIterator for Chunks {}
