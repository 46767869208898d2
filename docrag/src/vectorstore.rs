//! Vector store trait for persisting segments and searching them by similarity.

use async_trait::async_trait;

use crate::document::{SearchResult, Segment};
use crate::error::{RagError, Result};

/// A storage backend for embedded [`Segment`]s with similarity search.
///
/// A store holds a single index whose dimensionality is fixed by the first
/// record written. Writers are serialised by the implementation; readers may
/// run concurrently with writers and need not observe uncommitted writes.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.upsert_if_absent(&segment).await?;
/// let results = store.search(&query_embedding, 3).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert a segment, or replace the record that has the same id.
    ///
    /// A replaced record keeps its original insertion position.
    async fn upsert(&self, segment: &Segment) -> Result<()>;

    /// Insert a segment unless a record with the same id already exists.
    ///
    /// Returns `true` if the segment was inserted. The check and the insert
    /// happen atomically, so concurrent builds converge on one record.
    async fn upsert_if_absent(&self, segment: &Segment) -> Result<bool>;

    /// Whether a record with this id exists.
    async fn has(&self, id: &str) -> Result<bool>;

    /// Return the `top_k` records most similar to `embedding`.
    ///
    /// Results are ordered by descending cosine similarity; equal scores are
    /// ordered by insertion, earliest first. An empty index yields an empty
    /// result.
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    /// Number of records in the index.
    async fn len(&self) -> Result<usize>;

    /// Whether the index holds no records.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Dimensionality of the index, or `None` before the first record.
    async fn dimensions(&self) -> Result<Option<usize>>;

    /// Remove every record and reset the dimensionality.
    async fn clear(&self) -> Result<()>;
}

/// Reject `vector` if the index already has a different dimensionality or
/// the vector holds NaN or infinite components.
pub(crate) fn check_dimensions(expected: Option<usize>, vector: &[f32]) -> Result<()> {
    match expected {
        Some(expected) if expected != vector.len() => {
            Err(RagError::DimensionMismatch { expected, actual: vector.len() })
        }
        _ if !vector.iter().all(|x| x.is_finite()) => Err(RagError::EmbeddingUnavailable {
            provider: "vector_store".to_string(),
            message: "vector contains non-finite components".to_string(),
            retryable: false,
        }),
        _ => Ok(()),
    }
}

/// Whether every component of `vector` is zero.
///
/// A zero vector has no direction, so it scores 0.0 against everything.
pub(crate) fn is_zero_vector(vector: &[f32]) -> bool {
    vector.iter().all(|x| *x == 0.0)
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Score `candidates` against `query` and keep the best `top_k`.
///
/// Candidates must already be in insertion order; the stable sort keeps that
/// order among equal scores.
pub(crate) fn rank<I>(candidates: I, query: &[f32], top_k: usize) -> Vec<SearchResult>
where
    I: IntoIterator<Item = Segment>,
{
    if top_k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<SearchResult> = candidates
        .into_iter()
        .map(|mut segment| {
            let score = cosine_similarity(&segment.vector, query);
            segment.vector = Vec::new();
            SearchResult { segment, score }
        })
        .collect();

    scored.sort_by(|a, b| sort_key(b.score).total_cmp(&sort_key(a.score)));
    scored.truncate(top_k);
    scored
}

/// NaN ranks below every real score; `-0.0` ties with `0.0`.
fn sort_key(score: f32) -> f32 {
    if score.is_nan() { f32::NEG_INFINITY } else { score + 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_and_orthogonal_vectors() {
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn dimension_check_only_applies_once_fixed() {
        assert!(check_dimensions(None, &[1.0, 2.0]).is_ok());
        assert!(check_dimensions(Some(2), &[1.0, 2.0]).is_ok());
        assert!(matches!(
            check_dimensions(Some(3), &[1.0, 2.0]),
            Err(RagError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn non_finite_vectors_are_rejected() {
        for bad in [[f32::NAN, 0.0], [f32::INFINITY, 1.0], [0.0, f32::NEG_INFINITY]] {
            let err = check_dimensions(Some(2), &bad).unwrap_err();
            assert!(matches!(err, RagError::EmbeddingUnavailable { retryable: false, .. }));
        }
        assert!(check_dimensions(None, &[f32::NAN]).is_err());
    }

    fn segment(n: usize, vector: Vec<f32>) -> Segment {
        use crate::document::{Locator, SourceMetadata};
        let metadata = SourceMetadata {
            source: format!("doc{n}.txt"),
            locator: Locator::Offset(0),
            start: n,
            end: n + 1,
        };
        Segment::new(format!("segment {n}"), metadata).with_vector(vector)
    }

    #[test]
    fn nan_scores_rank_last() {
        let candidates = vec![
            segment(0, vec![f32::NAN, 0.0]),
            segment(1, vec![0.9, 0.1]),
            segment(2, vec![f32::NAN, 0.0]),
            segment(3, vec![0.5, 0.5]),
            segment(4, vec![0.0, 1.0]),
        ];

        let results = rank(candidates, &[1.0, 0.0], 5);
        let sources: Vec<&str> = results.iter().map(|r| r.segment.metadata.source.as_str()).collect();
        assert_eq!(sources, ["doc1.txt", "doc3.txt", "doc4.txt", "doc0.txt", "doc2.txt"]);

        let top = rank(
            vec![segment(0, vec![f32::NAN, 0.0]), segment(1, vec![0.9, 0.1])],
            &[1.0, 0.0],
            1,
        );
        assert_eq!(top[0].segment.metadata.source, "doc1.txt");
    }

    #[test]
    fn zero_vectors_are_detected() {
        assert!(is_zero_vector(&[0.0, -0.0, 0.0]));
        assert!(!is_zero_vector(&[0.0, 1e-9]));
    }
}
