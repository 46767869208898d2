//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a zero-dependency vector store
//! backed by insertion-ordered records protected by a `tokio::sync::RwLock`. It
//! is suitable for development, testing, and ephemeral indexes; records do not
//! survive the process.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{SearchResult, Segment};
use crate::error::Result;
use crate::vectorstore::{VectorStore, check_dimensions, rank};

#[derive(Debug, Default)]
struct Records {
    /// Segments in insertion order.
    segments: Vec<Segment>,
    /// Segment id → position in `segments`.
    positions: HashMap<String, usize>,
    dimensions: Option<usize>,
}

/// An in-memory vector store using cosine similarity for search.
///
/// The whole index sits behind one `RwLock`: writes take the write lock, so
/// concurrent writers to the same id never interleave, and searches share the
/// read lock.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.upsert(&segment).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    records: RwLock<Records>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, segment: &Segment) -> Result<()> {
        let mut records = self.records.write().await;
        check_dimensions(records.dimensions, &segment.vector)?;

        if let Some(&position) = records.positions.get(&segment.id) {
            records.segments[position] = segment.clone();
        } else {
            let position = records.segments.len();
            records.positions.insert(segment.id.clone(), position);
            records.segments.push(segment.clone());
        }
        records.dimensions.get_or_insert(segment.vector.len());
        Ok(())
    }

    async fn upsert_if_absent(&self, segment: &Segment) -> Result<bool> {
        let mut records = self.records.write().await;
        check_dimensions(records.dimensions, &segment.vector)?;

        if records.positions.contains_key(&segment.id) {
            return Ok(false);
        }
        let position = records.segments.len();
        records.positions.insert(segment.id.clone(), position);
        records.segments.push(segment.clone());
        records.dimensions.get_or_insert(segment.vector.len());
        Ok(true)
    }

    async fn has(&self, id: &str) -> Result<bool> {
        Ok(self.records.read().await.positions.contains_key(id))
    }

    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let records = self.records.read().await;
        if records.segments.is_empty() {
            return Ok(Vec::new());
        }
        check_dimensions(records.dimensions, embedding)?;
        Ok(rank(records.segments.iter().cloned(), embedding, top_k))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.read().await.segments.len())
    }

    async fn dimensions(&self) -> Result<Option<usize>> {
        Ok(self.records.read().await.dimensions)
    }

    async fn clear(&self) -> Result<()> {
        *self.records.write().await = Records::default();
        Ok(())
    }
}
