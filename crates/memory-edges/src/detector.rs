//! The edge detector.
//!
//! For each active edge, patterns are tried in kind order (code, context,
//! intent). Kind order is severity order, so the first hit is the edge's
//! only warning for the call. Warnings are then ordered by severity
//! descending, previous `last_triggered_at` descending, id ascending.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use memory_storage::{EdgeUpdate, MemoryStore, StorageError};
use memory_types::{
    DetectionPattern, EdgeConfig, PatternKind, Settings, SharpEdge, Warning,
};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::error::EdgeError;
use crate::pattern::{CompiledPattern, EdgeInput};

/// A compiled code regex, remembered with the source it came from so an
/// edge re-registered under the same id is recompiled.
#[derive(Debug, Clone)]
struct CachedRegex {
    source: String,
    regex: Option<Regex>,
}

pub struct EdgeDetector {
    store: Arc<dyn MemoryStore>,
    config: EdgeConfig,
    regex_cache: DashMap<(String, usize), CachedRegex>,
}

/// One edge's hit before ordering.
struct Hit {
    warning: Warning,
    previously_triggered: Option<DateTime<Utc>>,
}

impl EdgeDetector {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            config: EdgeConfig::default(),
            regex_cache: DashMap::new(),
        }
    }

    pub fn from_settings(store: Arc<dyn MemoryStore>, settings: &Settings) -> Self {
        Self::new(store).with_config(settings.edges.clone())
    }

    pub fn with_config(mut self, config: EdgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Store a new or replacement edge.
    ///
    /// Invalid code regexes do not block registration; the edge is stored
    /// flagged for review.
    pub fn register_edge(&self, mut edge: SharpEdge) -> Result<SharpEdge, EdgeError> {
        for (index, pattern) in edge.detection_patterns.iter().enumerate() {
            if let DetectionPattern::Code { regex } = pattern {
                if let Err(e) = Regex::new(regex) {
                    warn!(
                        edge_id = %edge.id,
                        pattern_index = index,
                        error = %e,
                        "Invalid code pattern"
                    );
                    edge.needs_review = true;
                }
            }
        }
        self.store.put_edge(&edge)?;
        self.forget_compiled(&edge.id);
        info!(
            edge_id = %edge.id,
            patterns = edge.detection_patterns.len(),
            "Registered sharp edge"
        );
        Ok(edge)
    }

    /// Stop evaluating an edge.
    pub fn retire_edge(&self, id: &str) -> Result<SharpEdge, EdgeError> {
        let retired = self
            .store
            .update_edge(id, &EdgeUpdate::retire())
            .map_err(|e| match e {
                StorageError::NotFound(_) => EdgeError::NotFound(id.to_string()),
                other => EdgeError::Storage(other),
            })?;
        self.forget_compiled(id);
        info!(edge_id = %id, "Retired sharp edge");
        Ok(retired)
    }

    /// Edges with a pattern that failed to compile.
    pub fn edges_needing_review(&self) -> Result<Vec<SharpEdge>, EdgeError> {
        Ok(self
            .store
            .list_edges()?
            .into_iter()
            .filter(|edge| edge.needs_review)
            .collect())
    }

    /// Match `code`, `intent` and `context` against every active edge.
    ///
    /// Malformed patterns are skipped; their edge is flagged for review and
    /// evaluation continues.
    #[instrument(skip_all)]
    pub fn check_edges(
        &self,
        code: &str,
        intent: &str,
        context: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Warning>, EdgeError> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }

        let input = EdgeInput::new(code, intent, context);
        let mut hits = Vec::new();

        for edge in self.store.list_edges()? {
            if !edge.is_active() {
                continue;
            }
            let (best, malformed) = self.evaluate(&edge, &input);
            if malformed && !edge.needs_review {
                self.flag_for_review(&edge.id);
            }
            if let Some((kind, index)) = best {
                hits.push(Hit {
                    warning: Warning {
                        edge_id: edge.id.clone(),
                        description: edge.description.clone(),
                        workaround: edge.workaround.clone(),
                        pattern_kind: kind,
                        pattern_index: index,
                        severity: kind.severity(),
                    },
                    previously_triggered: edge.last_triggered_at,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.warning
                .severity
                .cmp(&a.warning.severity)
                .then_with(|| b.previously_triggered.cmp(&a.previously_triggered))
                .then_with(|| a.warning.edge_id.cmp(&b.warning.edge_id))
        });

        for hit in &hits {
            if let Err(e) = self
                .store
                .update_edge(&hit.warning.edge_id, &EdgeUpdate::triggered(now))
            {
                warn!(
                    edge_id = %hit.warning.edge_id,
                    error = %e,
                    "Failed to record edge trigger"
                );
            }
        }

        debug!(warnings = hits.len(), "Edge check complete");
        Ok(hits.into_iter().map(|hit| hit.warning).collect())
    }

    /// The highest-severity matching pattern, and whether any pattern was
    /// malformed.
    fn evaluate(
        &self,
        edge: &SharpEdge,
        input: &EdgeInput<'_>,
    ) -> (Option<(PatternKind, usize)>, bool) {
        let mut malformed = false;
        for kind in [PatternKind::Code, PatternKind::Context, PatternKind::Intent] {
            for (index, pattern) in edge.detection_patterns.iter().enumerate() {
                if pattern.kind() != kind {
                    continue;
                }
                let Some(compiled) = self.compile(&edge.id, index, pattern) else {
                    malformed = true;
                    continue;
                };
                if compiled.matches(input, &self.config) {
                    return (Some((kind, index)), malformed);
                }
            }
        }
        (None, malformed)
    }

    fn compile(
        &self,
        edge_id: &str,
        index: usize,
        pattern: &DetectionPattern,
    ) -> Option<CompiledPattern> {
        match pattern {
            DetectionPattern::Code { regex } => self
                .cached_regex(edge_id, index, regex)
                .map(CompiledPattern::Code),
            DetectionPattern::Context { predicates } => {
                Some(CompiledPattern::Context(predicates.clone()))
            }
            DetectionPattern::Intent { terms } => Some(CompiledPattern::Intent(terms.clone())),
        }
    }

    fn cached_regex(&self, edge_id: &str, index: usize, source: &str) -> Option<Regex> {
        let key = (edge_id.to_string(), index);
        if let Some(cached) = self.regex_cache.get(&key) {
            if cached.source == source {
                return cached.regex.clone();
            }
        }

        let regex = match Regex::new(source) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(
                    edge_id,
                    pattern_index = index,
                    error = %e,
                    "Skipping malformed code pattern"
                );
                None
            }
        };
        self.regex_cache.insert(
            key,
            CachedRegex {
                source: source.to_string(),
                regex: regex.clone(),
            },
        );
        regex
    }

    /// Drop every cached regex of one edge.
    fn forget_compiled(&self, edge_id: &str) {
        self.regex_cache.retain(|(id, _), _| id != edge_id);
    }

    fn flag_for_review(&self, edge_id: &str) {
        match self.store.update_edge(edge_id, &EdgeUpdate::flag_for_review()) {
            Ok(_) => info!(edge_id, "Flagged sharp edge for review"),
            Err(e) => warn!(edge_id, error = %e, "Failed to flag sharp edge for review"),
        }
    }
}
