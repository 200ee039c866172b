//! The decay sweep.
//!
//! Each pass recomputes salience for every active and archived item:
//!
//! ```text
//! salience = importance
//!          + recency(freshest touch, per-kind half-life)
//!          + frequency(access_count)
//!          + link_bonus     if any link target is active
//!          + project_bonus  if the item belongs to the active project
//! ```
//!
//! and applies at most one lifecycle step per item:
//!
//! | From     | Condition                                             | To       |
//! |----------|-------------------------------------------------------|----------|
//! | active   | salience < archive threshold                          | archived |
//! | archived | salience < delete threshold and grace period elapsed  | deleted  |
//!
//! Items referenced by another active item are never moved. A pass runs in
//! rounds until nothing changes, each round judged against a fresh snapshot,
//! so a second pass with the same clock is a no-op.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use chrono::{DateTime, Utc};
use memory_storage::{ItemFilter, ItemUpdate, MemoryStore};
use memory_types::weights::{age_days, frequency_weight, recency_weight};
use memory_types::{DecayConfig, ItemStatus, MemoryItem, Settings, WeightConfig};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::LifecycleError;
use crate::snapshot::LinkSnapshot;

/// Outcome of one decay pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecayReport {
    /// Items moved active -> archived
    pub archived: Vec<String>,
    /// Items moved archived -> deleted
    pub deleted: Vec<String>,
    /// Items below threshold but kept because an active item links to them
    pub protected: Vec<String>,
    /// Item visits across all rounds
    pub scanned: usize,
    pub rounds: usize,
}

impl DecayReport {
    pub fn transitions(&self) -> usize {
        self.archived.len() + self.deleted.len()
    }

    pub fn is_noop(&self) -> bool {
        self.transitions() == 0
    }
}

/// What one item should do in the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Keep,
    Protected,
    Move(ItemStatus),
}

pub struct DecayEngine {
    store: Arc<dyn MemoryStore>,
    config: DecayConfig,
    weights: WeightConfig,
    active_project: Option<String>,
    /// Held for a whole pass; no two sweeps overlap in one process
    sweep_lock: Mutex<()>,
}

impl DecayEngine {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            config: DecayConfig::default(),
            weights: WeightConfig::default(),
            active_project: None,
            sweep_lock: Mutex::new(()),
        }
    }

    pub fn from_settings(store: Arc<dyn MemoryStore>, settings: &Settings) -> Self {
        let engine = Self::new(store)
            .with_config(settings.decay.clone())
            .with_weights(settings.weights.clone());
        match &settings.active_project {
            Some(project) => engine.with_active_project(project.clone()),
            None => engine,
        }
    }

    pub fn with_config(mut self, config: DecayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_weights(mut self, weights: WeightConfig) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_active_project(mut self, project_id: impl Into<String>) -> Self {
        self.active_project = Some(project_id.into());
        self
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    /// Current salience of `item` against `snapshot`.
    pub fn salience(&self, item: &MemoryItem, now: DateTime<Utc>, snapshot: &LinkSnapshot) -> f64 {
        let recency = recency_weight(
            age_days(item.freshest_touch(), now),
            self.weights.half_life_days(item.kind),
        );
        let frequency = frequency_weight(item.access_count, self.weights.freq_cap, 0.0);
        let link_bonus = if snapshot.has_active_link(item) {
            self.config.link_bonus
        } else {
            0.0
        };
        let project_bonus = match (&self.active_project, &item.project_id) {
            (Some(active), Some(owner)) if active == owner => self.config.project_bonus,
            _ => 0.0,
        };
        item.importance + recency + frequency + link_bonus + project_bonus
    }

    /// Run one pass, waiting for any sweep already in progress.
    pub fn run_decay_pass(&self, now: DateTime<Utc>) -> Result<DecayReport, LifecycleError> {
        let _guard = lock_ignoring_poison(&self.sweep_lock);
        self.sweep(now)
    }

    /// Run one pass unless another sweep holds the lock, in which case
    /// `None` is returned immediately.
    pub fn try_run_decay_pass(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<DecayReport>, LifecycleError> {
        let _guard = match self.sweep_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("Decay sweep already running, skipping");
                return Ok(None);
            }
        };
        self.sweep(now).map(Some)
    }

    #[instrument(skip(self))]
    fn sweep(&self, now: DateTime<Utc>) -> Result<DecayReport, LifecycleError> {
        let mut report = DecayReport::default();
        let mut moved: HashSet<String> = HashSet::new();
        let mut protected: HashSet<String> = HashSet::new();

        loop {
            report.rounds += 1;
            let snapshot = LinkSnapshot::build(self.store.as_ref(), self.config.page_size)?;
            let before = report.transitions();
            self.round(now, &snapshot, &mut moved, &mut protected, &mut report)?;
            if report.transitions() == before {
                break;
            }
        }

        // Protected in an early round but moved in a later one
        let mut protected: Vec<String> = protected.difference(&moved).cloned().collect();
        protected.sort();
        report.protected = protected;

        info!(
            archived = report.archived.len(),
            deleted = report.deleted.len(),
            protected = report.protected.len(),
            scanned = report.scanned,
            rounds = report.rounds,
            "Decay pass complete"
        );
        Ok(report)
    }

    fn round(
        &self,
        now: DateTime<Utc>,
        snapshot: &LinkSnapshot,
        moved: &mut HashSet<String>,
        protected: &mut HashSet<String>,
        report: &mut DecayReport,
    ) -> Result<(), LifecycleError> {
        let page_size = self.config.page_size.max(1);
        let mut filter = ItemFilter::all()
            .with_statuses([ItemStatus::Active, ItemStatus::Archived])
            .limit(page_size);

        loop {
            let page = self.store.query_items(&filter)?;
            let Some(last) = page.last() else {
                break;
            };
            filter.after_id = Some(last.id.clone());
            let full = page.len() == page_size;

            for item in page {
                if moved.contains(&item.id) {
                    continue;
                }
                report.scanned += 1;
                match self.verdict(&item, now, snapshot)? {
                    Verdict::Keep => {}
                    Verdict::Protected => {
                        protected.insert(item.id.clone());
                    }
                    Verdict::Move(to) => {
                        if let Some(stored) = self.apply(&item, to, now, snapshot)? {
                            moved.insert(stored.id.clone());
                            match stored.status {
                                ItemStatus::Archived => report.archived.push(stored.id),
                                ItemStatus::Deleted => report.deleted.push(stored.id),
                                ItemStatus::Active => {}
                            }
                        }
                    }
                }
            }

            if !full {
                break;
            }
        }
        Ok(())
    }

    fn verdict(
        &self,
        item: &MemoryItem,
        now: DateTime<Utc>,
        snapshot: &LinkSnapshot,
    ) -> Result<Verdict, LifecycleError> {
        let salience = self.salience(item, now, snapshot);
        let target = match item.status {
            ItemStatus::Active if salience < self.config.archive_threshold => {
                item.status.archive()?
            }
            ItemStatus::Archived
                if salience < self.config.delete_threshold
                    && now.signed_duration_since(item.status_changed_at)
                        > self.config.grace_period() =>
            {
                item.status.delete()?
            }
            _ => return Ok(Verdict::Keep),
        };

        if snapshot.is_protected(&item.id) {
            debug!(
                item_id = %item.id,
                salience,
                "Below threshold but referenced by an active item"
            );
            return Ok(Verdict::Protected);
        }
        Ok(Verdict::Move(target))
    }

    /// Conditionally write one transition.
    ///
    /// A version conflict means someone touched the item since it was read;
    /// the fresh copy is judged again once and otherwise left for the next
    /// pass.
    fn apply(
        &self,
        item: &MemoryItem,
        to: ItemStatus,
        now: DateTime<Utc>,
        snapshot: &LinkSnapshot,
    ) -> Result<Option<MemoryItem>, LifecycleError> {
        match self
            .store
            .update_item(&item.id, &ItemUpdate::transition(item, to, now))
        {
            Ok(stored) => {
                debug!(
                    item_id = %stored.id,
                    from = %item.status,
                    to = %to,
                    "Transitioned item"
                );
                return Ok(Some(stored));
            }
            Err(e) if e.is_conflict() => {}
            Err(e) => return Err(e.into()),
        }

        let Some(fresh) = self.store.get_item(&item.id)? else {
            return Ok(None);
        };
        let Verdict::Move(to) = self.verdict(&fresh, now, snapshot)? else {
            return Ok(None);
        };
        match self
            .store
            .update_item(&fresh.id, &ItemUpdate::transition(&fresh, to, now))
        {
            Ok(stored) => Ok(Some(stored)),
            Err(e) if e.is_conflict() => {
                warn!(item_id = %fresh.id, "Transition skipped after repeated conflict");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Explicitly step an item back: deleted -> archived or archived -> active.
    ///
    /// Leaves `access_count` untouched.
    pub fn restore(&self, id: &str, now: DateTime<Utc>) -> Result<MemoryItem, LifecycleError> {
        let item = self
            .store
            .get_item(id)?
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;
        let to = item.status.restore()?;
        let restored = self
            .store
            .update_item(id, &ItemUpdate::transition(&item, to, now))?;
        info!(item_id = %id, from = %item.status, to = %to, "Restored item");
        Ok(restored)
    }
}

fn lock_ignoring_poison(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use memory_storage::InMemoryStore;
    use memory_types::ItemKind;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn engine() -> (Arc<InMemoryStore>, DecayEngine) {
        let store = Arc::new(InMemoryStore::new());
        let engine = DecayEngine::new(store.clone());
        (store, engine)
    }

    /// Salience ~0.25 at `now`: importance 0.25, ancient, never read.
    fn faded(id: &str, now: DateTime<Utc>) -> MemoryItem {
        MemoryItem::with_id(id, ItemKind::Learning, "x")
            .with_importance(0.25)
            .with_created_at(now - Duration::days(3650))
    }

    fn status(store: &InMemoryStore, id: &str) -> ItemStatus {
        store.get_item(id).unwrap().unwrap().status
    }

    #[test]
    fn test_salience_components() {
        let (_, engine) = engine();
        let engine = engine.with_active_project("p");
        let now = Utc::now();
        let target = MemoryItem::with_id("t", ItemKind::Learning, "x");
        let item = MemoryItem::with_id("a", ItemKind::Learning, "x")
            .with_importance(0.5)
            .with_created_at(now)
            .with_access_count(20)
            .with_project("p")
            .with_link("t");
        let snapshot = LinkSnapshot::from_items([&target, &item]);

        // 0.5 + 1.0 + 1.0 + 0.2 + 0.2
        assert!((engine.salience(&item, now, &snapshot) - 2.9).abs() < 1e-9);
    }

    #[test]
    fn test_archives_low_salience_once() {
        let (store, engine) = engine();
        let now = Utc::now();
        store.put_item(&faded("low", now)).unwrap();

        let first = engine.run_decay_pass(now).unwrap();
        assert_eq!(first.archived, vec!["low".to_string()]);
        assert!(first.deleted.is_empty());
        assert_eq!(status(&store, "low"), ItemStatus::Archived);

        let second = engine.run_decay_pass(now).unwrap();
        assert!(second.is_noop());
        assert_eq!(status(&store, "low"), ItemStatus::Archived);
    }

    #[test]
    fn test_never_skips_a_state() {
        let (store, engine) = engine();
        let now = Utc::now();
        // Far below both thresholds, but still active
        store
            .put_item(&faded("x", now).with_importance(0.0))
            .unwrap();

        let report = engine.run_decay_pass(now).unwrap();
        assert_eq!(report.archived, vec!["x".to_string()]);
        assert!(report.deleted.is_empty());
    }

    #[test]
    fn test_delete_waits_for_grace_period() {
        let (store, engine) = engine();
        let now = Utc::now();
        let archived_at = now - Duration::days(10);
        store
            .put_item(
                &faded("old", now)
                    .with_importance(0.0)
                    .with_status(ItemStatus::Archived, archived_at),
            )
            .unwrap();

        assert!(engine.run_decay_pass(now).unwrap().is_noop());

        let later = now + Duration::days(5);
        let report = engine.run_decay_pass(later).unwrap();
        assert_eq!(report.deleted, vec!["old".to_string()]);
        assert_eq!(status(&store, "old"), ItemStatus::Deleted);
    }

    #[test]
    fn test_archived_between_thresholds_stays() {
        let (store, engine) = engine();
        let now = Utc::now();
        // Salience ~0.25: under archive, above delete
        store
            .put_item(
                &faded("mid", now).with_status(ItemStatus::Archived, now - Duration::days(60)),
            )
            .unwrap();
        assert!(engine.run_decay_pass(now).unwrap().is_noop());
    }

    #[test]
    fn test_linked_item_is_protected() {
        let (store, engine) = engine();
        let now = Utc::now();
        let referrer = MemoryItem::with_id("ref", ItemKind::Decision, "x")
            .with_importance(1.0)
            .with_link("target");
        store.put_item(&referrer).unwrap();
        store.put_item(&faded("target", now).with_importance(0.0)).unwrap();

        let report = engine.run_decay_pass(now).unwrap();
        assert!(report.is_noop());
        assert_eq!(report.protected, vec!["target".to_string()]);
        assert_eq!(status(&store, "target"), ItemStatus::Active);
    }

    #[test]
    fn test_protection_lapses_with_referrer_in_same_pass() {
        let (store, engine) = engine();
        let now = Utc::now();
        // Referrer itself fades, so the target loses protection
        store
            .put_item(&faded("ref", now).with_importance(0.0).with_link("target"))
            .unwrap();
        store
            .put_item(&faded("target", now).with_importance(0.0))
            .unwrap();

        let first = engine.run_decay_pass(now).unwrap();
        let mut archived = first.archived.clone();
        archived.sort();
        assert_eq!(archived, vec!["ref".to_string(), "target".to_string()]);
        assert!(first.protected.is_empty());

        assert!(engine.run_decay_pass(now).unwrap().is_noop());
    }

    #[test]
    fn test_deleted_items_skipped() {
        let (store, engine) = engine();
        let now = Utc::now();
        store
            .put_item(
                &faded("gone", now).with_status(ItemStatus::Deleted, now - Duration::days(100)),
            )
            .unwrap();
        let report = engine.run_decay_pass(now).unwrap();
        assert!(report.is_noop());
        assert_eq!(report.scanned, 0);
    }

    #[test]
    fn test_project_bonus_keeps_item_active() {
        let store = Arc::new(InMemoryStore::new());
        let engine = DecayEngine::new(store.clone()).with_active_project("api");
        let now = Utc::now();
        store
            .put_item(&faded("mine", now).with_project("api"))
            .unwrap();
        store
            .put_item(&faded("theirs", now).with_project("web"))
            .unwrap();

        let report = engine.run_decay_pass(now).unwrap();
        assert_eq!(report.archived, vec!["theirs".to_string()]);
    }

    #[test]
    fn test_paging_covers_every_item() {
        let store = Arc::new(InMemoryStore::new());
        let engine = DecayEngine::new(store.clone()).with_config(DecayConfig {
            page_size: 3,
            ..Default::default()
        });
        let now = Utc::now();
        for i in 0..10 {
            store.put_item(&faded(&format!("i{i:02}"), now)).unwrap();
        }

        let report = engine.run_decay_pass(now).unwrap();
        assert_eq!(report.archived.len(), 10);
    }

    #[test]
    fn test_restore_steps_back_one_state() {
        let (store, engine) = engine();
        let now = Utc::now();
        store
            .put_item(
                &faded("r", now)
                    .with_access_count(7)
                    .with_status(ItemStatus::Deleted, now - Duration::days(1)),
            )
            .unwrap();

        let restored = engine.restore("r", now).unwrap();
        assert_eq!(restored.status, ItemStatus::Archived);
        assert_eq!(restored.status_changed_at, now);
        assert_eq!(restored.access_count, 7);

        let restored = engine.restore("r", now).unwrap();
        assert_eq!(restored.status, ItemStatus::Active);

        assert!(matches!(
            engine.restore("r", now),
            Err(LifecycleError::Memory(_))
        ));
        assert!(matches!(
            engine.restore("missing", now),
            Err(LifecycleError::NotFound(_))
        ));
    }

    #[test]
    fn test_try_run_skips_while_sweep_held() {
        let (_, engine) = engine();
        let _held = engine.sweep_lock.lock().unwrap();
        assert_eq!(engine.try_run_decay_pass(Utc::now()).unwrap(), None);
    }

    proptest! {
        #[test]
        fn prop_second_pass_is_noop(
            specs in proptest::collection::vec(
                (0.0f64..=1.0, 0i64..400, 0u32..30, 0usize..3, proptest::option::of(0usize..12)),
                1..12,
            ),
            archived_age in proptest::option::of(0i64..60),
        ) {
            let store = Arc::new(InMemoryStore::new());
            let engine = DecayEngine::new(store.clone()).with_active_project("p");
            let now = Utc::now();

            for (i, (importance, age, count, project, link)) in specs.iter().enumerate() {
                let mut item = MemoryItem::with_id(format!("i{i:02}"), ItemKind::Learning, "x")
                    .with_importance(*importance)
                    .with_created_at(now - Duration::days(*age))
                    .with_access_count(*count);
                if *project == 1 {
                    item = item.with_project("p");
                }
                if let Some(target) = link {
                    item = item.with_link(format!("i{target:02}"));
                }
                if let (Some(days), 0) = (archived_age, i % 2) {
                    item = item.with_status(ItemStatus::Archived, now - Duration::days(days));
                }
                store.put_item(&item).unwrap();
            }

            let first = engine.run_decay_pass(now).unwrap();
            let second = engine.run_decay_pass(now).unwrap();
            prop_assert!(second.is_noop(), "first={:?} second={:?}", first, second);

            // No item moved more than one step
            let mut seen = HashSet::new();
            for id in first.archived.iter().chain(first.deleted.iter()) {
                prop_assert!(seen.insert(id.clone()));
            }
        }
    }
}
