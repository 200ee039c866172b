//! The context engine.
//!
//! ## Pipeline
//!
//! ```text
//!   query ──▶ trigger tier (active items whose phrases match)   score = 1 + ε·recency
//!     │
//!     └────▶ semantic tier (top-N from the vector index)        score = Π weights
//!                    │
//!                    ▼
//!          merge by id (max score) ─▶ rank ─▶ truncate k ─▶ record access
//! ```
//!
//! Ranking order: score descending, then `last_accessed_at` descending, then
//! id ascending.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use memory_storage::{ItemFilter, ItemUpdate, MemoryStore};
use memory_types::{ContextConfig, ItemStatus, MemoryItem, Settings, WeightConfig};
use memory_vector::{Embedding, SearchResult, VectorIndex};
use tracing::{debug, instrument, warn};

use crate::error::RetrievalError;
use crate::query::{ContextQuery, ScoreBreakdown, ScoredItem, Tier};
use crate::scoring::{shared_link_count, Scorer};
use crate::trigger::TriggerMatcher;

/// Items read per page while scanning trigger phrases.
const TRIGGER_SCAN_PAGE: usize = 256;

pub struct ContextEngine {
    store: Arc<dyn MemoryStore>,
    index: Arc<dyn VectorIndex>,
    config: ContextConfig,
    weights: WeightConfig,
}

impl ContextEngine {
    /// Create an engine with default ranking parameters.
    pub fn new(store: Arc<dyn MemoryStore>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            store,
            index,
            config: ContextConfig::default(),
            weights: WeightConfig::default(),
        }
    }

    pub fn from_settings(
        store: Arc<dyn MemoryStore>,
        index: Arc<dyn VectorIndex>,
        settings: &Settings,
    ) -> Self {
        Self::new(store, index)
            .with_config(settings.context.clone())
            .with_weights(settings.weights.clone())
    }

    pub fn with_config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_weights(mut self, weights: WeightConfig) -> Self {
        self.weights = weights;
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Rank memory items for `query` and record their retrieval.
    ///
    /// Never fails because of the vector index; only a failing item store is
    /// returned as an error.
    #[instrument(skip(self, query), fields(k = tracing::field::Empty))]
    pub fn get_relevant_context(
        &self,
        query: &ContextQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredItem>, RetrievalError> {
        let k = query.k.unwrap_or(self.config.default_k);
        tracing::Span::current().record("k", k);
        if k == 0 {
            return Ok(Vec::new());
        }

        let scorer = Scorer::new(&self.config, &self.weights, now);
        let mut merged: HashMap<String, ScoredItem> = HashMap::new();

        let matcher = TriggerMatcher::new(&query.text, &query.trigger_phrases);
        let triggered = self.trigger_tier(&matcher)?;
        debug!(count = triggered.len(), "Trigger tier matched");

        let semantic = match &query.embedding {
            Some(embedding) => self.semantic_hits(embedding)?,
            None => {
                debug!("No query embedding, trigger tier only");
                Vec::new()
            }
        };

        let candidate_ids: HashSet<String> = triggered
            .iter()
            .map(|item| item.id.clone())
            .chain(semantic.iter().map(|(item, _)| item.id.clone()))
            .collect();

        for item in triggered {
            let breakdown = scorer.breakdown(&item, 0.0, 0);
            let score = scorer.trigger_score(&item);
            merge(&mut merged, item, score, Tier::Trigger, breakdown);
        }

        for (item, similarity) in semantic {
            let shared = shared_link_count(&item, query.project_id.as_deref(), &candidate_ids);
            let breakdown = scorer.breakdown(&item, similarity, shared);
            let score = scorer.semantic_score(&breakdown);
            merge(&mut merged, item, score, Tier::Semantic, breakdown);
        }

        let mut ranked: Vec<ScoredItem> = merged.into_values().collect();
        ranked.sort_by(rank_order);
        ranked.truncate(k);

        for scored in &mut ranked {
            scored.item = self.record_access(&scored.item, now);
        }

        debug!(returned = ranked.len(), "Context retrieval complete");
        Ok(ranked)
    }

    /// Active items with a trigger phrase matching the query or session.
    fn trigger_tier(&self, matcher: &TriggerMatcher) -> Result<Vec<MemoryItem>, RetrievalError> {
        let mut matched = Vec::new();
        if matcher.is_empty() {
            return Ok(matched);
        }

        let mut filter = ItemFilter::all()
            .with_statuses([ItemStatus::Active])
            .limit(TRIGGER_SCAN_PAGE);
        loop {
            let page = self.store.query_items(&filter)?;
            let Some(last) = page.last() else {
                break;
            };
            filter.after_id = Some(last.id.clone());
            let full = page.len() == TRIGGER_SCAN_PAGE;

            matched.extend(
                page.into_iter()
                    .filter(|item| !item.trigger_phrases.is_empty() && matcher.matches(item)),
            );
            if !full {
                break;
            }
        }
        Ok(matched)
    }

    /// Nearest neighbours resolved to stored, searchable items.
    fn semantic_hits(
        &self,
        embedding: &Embedding,
    ) -> Result<Vec<(MemoryItem, f64)>, RetrievalError> {
        let searched = self
            .index
            .search(embedding, self.config.semantic_candidates);
        let hits: Vec<SearchResult> = match searched {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Vector index unavailable, falling back to trigger tier");
                return Ok(Vec::new());
            }
        };

        let mut resolved = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(item) = self.store.get_item(&hit.item_id)? else {
                debug!(item_id = %hit.item_id, "Indexed item missing from store, skipping");
                continue;
            };
            let searchable = match item.status {
                ItemStatus::Active => true,
                ItemStatus::Archived => self.config.include_archived,
                ItemStatus::Deleted => false,
            };
            if searchable {
                resolved.push((item, f64::from(hit.similarity)));
            }
        }
        Ok(resolved)
    }

    /// Increment the access counter with a version check, retrying once on
    /// conflict. Returns the stored item, or `item` unchanged if the update
    /// was dropped.
    fn record_access(&self, item: &MemoryItem, now: DateTime<Utc>) -> MemoryItem {
        match self.store.update_item(&item.id, &ItemUpdate::access(item, now)) {
            Ok(updated) => return updated,
            Err(e) if e.is_conflict() => {
                debug!(item_id = %item.id, "Access update conflicted, retrying with fresh read");
            }
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Failed to record access");
                return item.clone();
            }
        }

        let fresh = match self.store.get_item(&item.id) {
            Ok(Some(fresh)) => fresh,
            Ok(None) => return item.clone(),
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Failed to re-read item for access retry");
                return item.clone();
            }
        };

        match self.store.update_item(&item.id, &ItemUpdate::access(&fresh, now)) {
            Ok(updated) => updated,
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Dropping access increment after retry");
                fresh
            }
        }
    }
}

/// Keep the higher-scoring entry per id.
fn merge(
    merged: &mut HashMap<String, ScoredItem>,
    item: MemoryItem,
    score: f64,
    tier: Tier,
    breakdown: ScoreBreakdown,
) {
    match merged.get(&item.id) {
        Some(existing) if existing.score >= score => {}
        _ => {
            merged.insert(
                item.id.clone(),
                ScoredItem {
                    item,
                    score,
                    tier,
                    breakdown,
                },
            );
        }
    }
}

fn rank_order(a: &ScoredItem, b: &ScoredItem) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.item.last_accessed_at.cmp(&a.item.last_accessed_at))
        .then_with(|| a.item.id.cmp(&b.item.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use memory_storage::InMemoryStore;
    use memory_types::ItemKind;
    use memory_vector::{FlatIndex, VectorError};
    use pretty_assertions::assert_eq;

    struct DownIndex;

    impl VectorIndex for DownIndex {
        fn dimension(&self) -> usize {
            2
        }

        fn len(&self) -> usize {
            0
        }

        fn upsert(&self, _: &str, _: &Embedding) -> Result<(), VectorError> {
            Err(VectorError::Unavailable("down".to_string()))
        }

        fn remove(&self, _: &str) -> Result<bool, VectorError> {
            Err(VectorError::Unavailable("down".to_string()))
        }

        fn search(&self, _: &Embedding, _: usize) -> Result<Vec<SearchResult>, VectorError> {
            Err(VectorError::Unavailable("down".to_string()))
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        index: Arc<FlatIndex>,
        engine: ContextEngine,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let index = Arc::new(FlatIndex::new(2));
        let engine = ContextEngine::new(store.clone(), index.clone());
        Fixture {
            store,
            index,
            engine,
        }
    }

    impl Fixture {
        fn add(&self, item: MemoryItem, vector: [f32; 2]) {
            self.store.put_item(&item).unwrap();
            self.index.upsert(&item.id, &Embedding::new(vector.to_vec())).unwrap();
        }
    }

    fn query(text: &str) -> ContextQuery {
        ContextQuery::new(text).with_embedding(Embedding::new(vec![1.0, 0.0]))
    }

    #[test]
    fn test_results_unique_and_bounded() {
        let f = fixture();
        let now = Utc::now();
        for i in 0..10 {
            let item = MemoryItem::with_id(format!("item-{i:02}"), ItemKind::Learning, "x")
                .with_created_at(now)
                .with_trigger_phrase("release");
            f.add(item, [1.0, i as f32 * 0.1]);
        }

        let results = f
            .engine
            .get_relevant_context(&query("cutting a release today").with_k(4), now)
            .unwrap();
        assert_eq!(results.len(), 4);
        let ids: HashSet<_> = results.iter().map(|r| r.item.id.clone()).collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_trigger_outranks_equal_similarity() {
        let f = fixture();
        let now = Utc::now();
        f.add(
            MemoryItem::with_id("semantic", ItemKind::Learning, "x").with_created_at(now),
            [1.0, 0.0],
        );
        f.add(
            MemoryItem::with_id("trigger", ItemKind::Learning, "x")
                .with_created_at(now)
                .with_trigger_phrase("jwt"),
            [1.0, 0.0],
        );

        let results = f.engine.get_relevant_context(&query("JWT refresh"), now).unwrap();
        assert_eq!(results[0].item.id, "trigger");
        assert_eq!(results[0].tier, Tier::Trigger);
        assert_eq!(results[1].item.id, "semantic");
        assert_eq!(results[1].tier, Tier::Semantic);
    }

    #[test]
    fn test_records_access() {
        let f = fixture();
        let now = Utc::now();
        let created = now - Duration::days(2);
        f.add(
            MemoryItem::with_id("a", ItemKind::Decision, "x").with_created_at(created),
            [1.0, 0.0],
        );

        let results = f.engine.get_relevant_context(&query("anything"), now).unwrap();
        assert_eq!(results[0].item.access_count, 1);
        assert_eq!(results[0].item.last_accessed_at, now);

        let stored = f.store.get_item("a").unwrap().unwrap();
        assert_eq!(stored.access_count, 1);
        assert_eq!(stored.version, 1);
    }

    #[test]
    fn test_deleted_excluded_archived_penalized() {
        let f = fixture();
        let now = Utc::now();
        f.add(
            MemoryItem::with_id("active", ItemKind::Learning, "x").with_created_at(now),
            [1.0, 0.0],
        );
        f.add(
            MemoryItem::with_id("archived", ItemKind::Learning, "x")
                .with_created_at(now)
                .with_status(ItemStatus::Archived, now),
            [1.0, 0.0],
        );
        f.add(
            MemoryItem::with_id("deleted", ItemKind::Learning, "x")
                .with_created_at(now)
                .with_status(ItemStatus::Deleted, now)
                .with_trigger_phrase("anything"),
            [1.0, 0.0],
        );

        let results = f.engine.get_relevant_context(&query("anything"), now).unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(ids, vec!["active", "archived"]);
        assert!((results[1].score - results[0].score * 0.5).abs() < 1e-9);
        assert_eq!(results[1].breakdown.archive_penalty, 0.5);
    }

    #[test]
    fn test_archived_excluded_when_disabled() {
        let f = fixture();
        let engine =
            ContextEngine::new(f.store.clone(), f.index.clone()).with_config(ContextConfig {
                include_archived: false,
                ..Default::default()
            });
        let now = Utc::now();
        f.add(
            MemoryItem::with_id("archived", ItemKind::Learning, "x")
                .with_status(ItemStatus::Archived, now),
            [1.0, 0.0],
        );
        assert!(engine.get_relevant_context(&query("x"), now).unwrap().is_empty());
    }

    #[test]
    fn test_index_unavailable_degrades_to_triggers() {
        let store = Arc::new(InMemoryStore::new());
        let engine = ContextEngine::new(store.clone(), Arc::new(DownIndex));
        let now = Utc::now();
        store
            .put_item(&MemoryItem::with_id("t", ItemKind::Issue, "x").with_trigger_phrase("oom"))
            .unwrap();
        store
            .put_item(&MemoryItem::with_id("other", ItemKind::Issue, "y"))
            .unwrap();

        let results = engine
            .get_relevant_context(&query("worker OOM again"), now)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item.id, "t");
    }

    #[test]
    fn test_project_and_links_raise_relation() {
        let f = fixture();
        let now = Utc::now();
        f.add(
            MemoryItem::with_id("a", ItemKind::Learning, "x")
                .with_created_at(now)
                .with_project("api")
                .with_link("b"),
            [1.0, 0.0],
        );
        f.add(
            MemoryItem::with_id("b", ItemKind::Learning, "x").with_created_at(now),
            [1.0, 0.0],
        );

        let with_project = f
            .engine
            .get_relevant_context(&query("x").with_project("api"), now)
            .unwrap();
        let a = with_project.iter().find(|r| r.item.id == "a").unwrap();
        let b = with_project.iter().find(|r| r.item.id == "b").unwrap();
        assert!((a.breakdown.relation - 0.7).abs() < 1e-9);
        assert!((b.breakdown.relation - 0.5).abs() < 1e-9);
        assert_eq!(with_project[0].item.id, "a");
    }

    #[test]
    fn test_no_project_gives_base_relation() {
        let f = fixture();
        let now = Utc::now();
        f.add(
            MemoryItem::with_id("a", ItemKind::Learning, "x")
                .with_project("api")
                .with_link("b"),
            [1.0, 0.0],
        );
        f.add(MemoryItem::with_id("b", ItemKind::Learning, "x"), [1.0, 0.0]);

        let results = f.engine.get_relevant_context(&query("x"), now).unwrap();
        assert!(results
            .iter()
            .all(|r| (r.breakdown.relation - 0.5).abs() < 1e-9));
    }

    #[test]
    fn test_ties_break_by_last_access_then_id() {
        let f = fixture();
        let now = Utc::now();
        let created = now - Duration::days(1);
        // Equal scores: same vector, age, counts and importance
        for id in ["c", "a", "b"] {
            f.add(
                MemoryItem::with_id(id, ItemKind::Learning, "x").with_created_at(created),
                [1.0, 0.0],
            );
        }

        let results = f.engine.get_relevant_context(&query("x"), now).unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_k_zero_returns_nothing() {
        let f = fixture();
        f.add(MemoryItem::with_id("a", ItemKind::Learning, "x"), [1.0, 0.0]);
        let results = f
            .engine
            .get_relevant_context(&query("x").with_k(0), Utc::now())
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(f.store.get_item("a").unwrap().unwrap().access_count, 0);
    }
}
