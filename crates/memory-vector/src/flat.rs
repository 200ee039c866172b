//! Exact brute-force index.
//!
//! Scans every stored vector per query. Suitable for the item counts a
//! single agent accumulates and as the reference backend in tests.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::embedding::Embedding;
use crate::error::VectorError;
use crate::index::{SearchResult, VectorIndex};

pub struct FlatIndex {
    dimension: usize,
    vectors: RwLock<HashMap<String, Embedding>>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: RwLock::new(HashMap::new()),
        }
    }

    fn check_dimension(&self, embedding: &Embedding) -> Result<(), VectorError> {
        if embedding.dimension() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.dimension(),
            });
        }
        Ok(())
    }
}

fn poisoned<T>(_: T) -> VectorError {
    VectorError::Unavailable("index lock poisoned".to_string())
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.read().map(|v| v.len()).unwrap_or(0)
    }

    fn upsert(&self, item_id: &str, embedding: &Embedding) -> Result<(), VectorError> {
        self.check_dimension(embedding)?;
        let mut vectors = self.vectors.write().map_err(poisoned)?;
        vectors.insert(item_id.to_string(), embedding.clone());
        debug!(item_id, "Indexed vector");
        Ok(())
    }

    fn remove(&self, item_id: &str) -> Result<bool, VectorError> {
        let mut vectors = self.vectors.write().map_err(poisoned)?;
        Ok(vectors.remove(item_id).is_some())
    }

    fn search(&self, query: &Embedding, k: usize) -> Result<Vec<SearchResult>, VectorError> {
        self.check_dimension(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let vectors = self.vectors.read().map_err(poisoned)?;
        let mut results: Vec<SearchResult> = vectors
            .iter()
            .map(|(id, emb)| SearchResult::new(id.clone(), query.cosine_similarity(emb)))
            .collect();

        // Best first; ties broken by id for a stable order
        results.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        results.truncate(k);
        Ok(results)
    }
}
