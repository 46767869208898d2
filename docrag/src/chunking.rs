//! Splitting text into overlapping fixed-size spans.
//!
//! This module provides the [`Chunker`] trait and [`FixedSizeChunker`], which
//! splits by character count with a configurable overlap. Sizes and offsets
//! are counted in characters (Unicode scalar values), never bytes, so spans
//! always fall on valid UTF-8 boundaries.

use crate::error::{RagError, Result};

/// A contiguous span of a larger text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    /// Start character offset (inclusive).
    pub start: usize,
    /// End character offset (exclusive).
    pub end: usize,
    /// The text covered by the span.
    pub text: String,
}

/// A strategy for splitting text into spans suitable for embedding.
///
/// Implementations must be deterministic: the same input always produces the
/// same span boundaries, which keeps segment ids stable across re-indexing.
pub trait Chunker: Send + Sync {
    /// Split `text` into ordered spans.
    ///
    /// Returns an empty `Vec` for empty or whitespace-only input.
    fn split(&self, text: &str) -> Result<Vec<TextSpan>>;
}

/// Splits text into fixed-size spans by character count with overlap.
///
/// Spans start at `0, step, 2 * step, ...` for as long as the start lies
/// inside the text, where `step = chunk_size - chunk_overlap`. Every span is
/// `chunk_size` characters long except where clipped by the end of the text,
/// so consecutive spans share exactly `chunk_overlap` characters except
/// possibly the last pair, and the spans cover the input with no gaps.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(1000, 200);
/// let spans = chunker.split(&text)?;
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` – maximum number of characters per span
    /// * `chunk_overlap` – number of characters shared by consecutive spans
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }

    /// Maximum characters per span.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters shared by consecutive spans.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Chunker for FixedSizeChunker {
    fn split(&self, text: &str) -> Result<Vec<TextSpan>> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Chunking {
                document: String::new(),
                message: format!(
                    "chunk_overlap ({}) must be less than chunk_size ({})",
                    self.chunk_overlap, self.chunk_size
                ),
            });
        }
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        // Byte offset of every character boundary, including the end of the text.
        let boundaries: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let char_count = boundaries.len() - 1;
        let step = self.chunk_size - self.chunk_overlap;

        let mut spans = Vec::with_capacity(char_count / step + 1);
        let mut start = 0;
        while start < char_count {
            let end = (start + self.chunk_size).min(char_count);
            spans.push(TextSpan {
                start,
                end,
                text: text[boundaries[start]..boundaries[end]].to_string(),
            });
            start += step;
        }

        Ok(spans)
    }
}
