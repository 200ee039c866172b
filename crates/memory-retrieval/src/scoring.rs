//! Per-candidate scoring for the two retrieval tiers.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use memory_types::weights::{
    age_days, clamp_similarity, composite_score, frequency_weight, importance_weight,
    recency_weight, relation_weight,
};
use memory_types::{ContextConfig, ItemStatus, MemoryItem, WeightConfig};

use crate::query::ScoreBreakdown;

/// Scores candidates against one clock reading.
pub struct Scorer<'a> {
    context: &'a ContextConfig,
    weights: &'a WeightConfig,
    now: DateTime<Utc>,
}

impl<'a> Scorer<'a> {
    pub fn new(context: &'a ContextConfig, weights: &'a WeightConfig, now: DateTime<Utc>) -> Self {
        Self {
            context,
            weights,
            now,
        }
    }

    pub fn recency(&self, item: &MemoryItem) -> f64 {
        recency_weight(
            age_days(item.freshest_touch(), self.now),
            self.weights.half_life_days(item.kind),
        )
    }

    /// Trigger-tier score: above every semantic score, ordered by recency.
    pub fn trigger_score(&self, item: &MemoryItem) -> f64 {
        1.0 + self.context.trigger_epsilon * self.recency(item)
    }

    /// All weight factors for a semantic candidate.
    pub fn breakdown(
        &self,
        item: &MemoryItem,
        similarity: f64,
        shared_links: usize,
    ) -> ScoreBreakdown {
        ScoreBreakdown {
            similarity: clamp_similarity(similarity),
            recency: self.recency(item),
            frequency: frequency_weight(
                item.access_count,
                self.weights.freq_cap,
                self.weights.frequency_floor,
            ),
            relation: relation_weight(
                shared_links,
                self.context.relation_base,
                self.context.relation_step,
            ),
            importance: importance_weight(item.importance),
            archive_penalty: match item.status {
                ItemStatus::Archived => self.context.archive_penalty,
                _ => 1.0,
            },
        }
    }

    /// Product of the factors in `breakdown`.
    pub fn semantic_score(&self, breakdown: &ScoreBreakdown) -> f64 {
        composite_score(
            breakdown.similarity,
            breakdown.recency,
            breakdown.frequency,
            breakdown.relation,
            breakdown.importance,
        ) * breakdown.archive_penalty
    }
}

/// Links shared with the session: one for membership in the session's
/// project, plus one per link to another current candidate.
///
/// Without a session project every candidate gets the base relation weight.
pub fn shared_link_count(
    item: &MemoryItem,
    project_id: Option<&str>,
    candidate_ids: &HashSet<String>,
) -> usize {
    let Some(project) = project_id else {
        return 0;
    };
    let in_project = usize::from(item.project_id.as_deref() == Some(project));
    let linked = item
        .links
        .iter()
        .filter(|target| **target != item.id && candidate_ids.contains(*target))
        .count();
    in_project + linked
}
