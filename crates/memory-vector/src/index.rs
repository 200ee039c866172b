//! Vector index trait and types.
//!
//! Defines the interface for vector similarity search. Entries are keyed by
//! memory item id, so an item's embedding lives only in the index.

use crate::embedding::Embedding;
use crate::error::VectorError;

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub item_id: String,
    /// Cosine similarity in [-1, 1], higher is closer
    pub similarity: f32,
}

impl SearchResult {
    pub fn new(item_id: impl Into<String>, similarity: f32) -> Self {
        Self {
            item_id: item_id.into(),
            similarity,
        }
    }
}

/// Trait for vector indexes.
///
/// Implementations must be thread-safe and take `&self` for writes, so one
/// index can be shared between retrieval and ingestion.
pub trait VectorIndex: Send + Sync {
    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the number of vectors in the index
    fn len(&self) -> usize;

    /// Check if the index is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace the vector for an item.
    fn upsert(&self, item_id: &str, embedding: &Embedding) -> Result<(), VectorError>;

    /// Remove an item's vector. Returns whether it existed.
    fn remove(&self, item_id: &str) -> Result<bool, VectorError>;

    /// Search for k nearest neighbors.
    /// Returns results sorted by similarity (best first).
    fn search(&self, query: &Embedding, k: usize) -> Result<Vec<SearchResult>, VectorError>;
}
