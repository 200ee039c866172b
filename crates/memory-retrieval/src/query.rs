//! Request and result types for context retrieval.

use memory_types::MemoryItem;
use memory_vector::{Embedding, EmbeddingModel};
use serde::Serialize;
use tracing::warn;

/// One retrieval request.
#[derive(Debug, Clone, Default)]
pub struct ContextQuery {
    pub text: String,
    /// Precomputed query embedding; without one only the trigger tier runs
    pub embedding: Option<Embedding>,
    /// Active project of the calling session
    pub project_id: Option<String>,
    /// Extra phrases the session wants matched against item triggers
    pub trigger_phrases: Vec<String>,
    /// Result count; the configured default when `None`
    pub k: Option<usize>,
}

impl ContextQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_trigger_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.trigger_phrases.push(phrase.into());
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    /// Compute the query embedding with `model`.
    ///
    /// A model failure leaves the embedding unset, which degrades the call to
    /// trigger-tier results.
    pub fn embed_with(mut self, model: &dyn EmbeddingModel) -> Self {
        match model.embed(&self.text) {
            Ok(embedding) => self.embedding = Some(embedding),
            Err(e) => warn!(error = %e, "Query embedding failed, semantic tier disabled"),
        }
        self
    }
}

/// Which tier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Trigger,
    Semantic,
}

/// Every factor behind a score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScoreBreakdown {
    /// Clamped cosine similarity; 0 for items only reached by trigger
    pub similarity: f64,
    pub recency: f64,
    pub frequency: f64,
    pub relation: f64,
    pub importance: f64,
    /// 1.0 for active items
    pub archive_penalty: f64,
}

/// A ranked retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredItem {
    /// The item as stored after this retrieval recorded its access
    pub item: MemoryItem,
    pub score: f64,
    pub tier: Tier,
    pub breakdown: ScoreBreakdown,
}
