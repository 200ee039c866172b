//! Memory items and their lifecycle state machine.
//!
//! A `MemoryItem` is one unit of captured knowledge. Items are never
//! physically removed by the core: `Deleted` is a soft, restorable state.
//!
//! ## Status transitions
//!
//! ```text
//!   Active ──archive──▶ Archived ──delete──▶ Deleted
//!     ▲                   │  ▲                  │
//!     └─────restore───────┘  └─────restore──────┘
//! ```

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::MemoryError;

/// Classification of captured knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// An architectural or product decision
    Decision,
    /// A known issue or bug
    Issue,
    /// Something learned while working
    #[default]
    Learning,
    /// A record of something that happened
    Episode,
    /// A fact about the current state of a project
    ProjectState,
    /// A fact about the user
    UserModel,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::Decision => write!(f, "decision"),
            ItemKind::Issue => write!(f, "issue"),
            ItemKind::Learning => write!(f, "learning"),
            ItemKind::Episode => write!(f, "episode"),
            ItemKind::ProjectState => write!(f, "project_state"),
            ItemKind::UserModel => write!(f, "user_model"),
        }
    }
}

/// Lifecycle status of a memory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Visible to retrieval at full score
    #[default]
    Active,
    /// Still searchable, scored with the archive penalty
    Archived,
    /// Excluded from retrieval, restorable
    Deleted,
}

impl ItemStatus {
    /// Forward decay step: Active -> Archived -> Deleted.
    ///
    /// Returns `None` for `Deleted`, which has no forward successor.
    pub fn next(self) -> Option<ItemStatus> {
        match self {
            ItemStatus::Active => Some(ItemStatus::Archived),
            ItemStatus::Archived => Some(ItemStatus::Deleted),
            ItemStatus::Deleted => None,
        }
    }

    /// Backward restore step: Deleted -> Archived -> Active.
    pub fn previous(self) -> Option<ItemStatus> {
        match self {
            ItemStatus::Active => None,
            ItemStatus::Archived => Some(ItemStatus::Active),
            ItemStatus::Deleted => Some(ItemStatus::Archived),
        }
    }

    /// Whether a single-step move from `self` to `to` is allowed.
    pub fn can_transition_to(self, to: ItemStatus) -> bool {
        self.next() == Some(to) || self.previous() == Some(to)
    }

    /// Validate a transition, returning the target status.
    pub fn transition_to(self, to: ItemStatus) -> Result<ItemStatus, MemoryError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(MemoryError::InvalidTransition { from: self, to })
        }
    }

    /// Decay step Active -> Archived.
    pub fn archive(self) -> Result<ItemStatus, MemoryError> {
        match self {
            ItemStatus::Active => Ok(ItemStatus::Archived),
            from => Err(MemoryError::InvalidTransition {
                from,
                to: ItemStatus::Archived,
            }),
        }
    }

    /// Decay step Archived -> Deleted.
    pub fn delete(self) -> Result<ItemStatus, MemoryError> {
        match self {
            ItemStatus::Archived => Ok(ItemStatus::Deleted),
            from => Err(MemoryError::InvalidTransition {
                from,
                to: ItemStatus::Deleted,
            }),
        }
    }

    /// Status after an explicit restore.
    pub fn restore(self) -> Result<ItemStatus, MemoryError> {
        match self.previous() {
            Some(to) => Ok(to),
            None => Err(MemoryError::InvalidTransition {
                from: self,
                to: self,
            }),
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Active => write!(f, "active"),
            ItemStatus::Archived => write!(f, "archived"),
            ItemStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// One unit of captured knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique, immutable identifier (ULID)
    pub id: String,
    pub kind: ItemKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// Number of times the item was returned by retrieval
    #[serde(default)]
    pub access_count: u32,
    /// Importance in [0.0, 1.0]
    pub importance: f64,
    /// Undirected "related-to" links to other item ids
    #[serde(default)]
    pub links: BTreeSet<String>,
    #[serde(default)]
    pub status: ItemStatus,
    pub status_changed_at: DateTime<Utc>,
    /// Owning project; `None` for global items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Short phrases that pull this item into the trigger tier
    #[serde(default)]
    pub trigger_phrases: Vec<String>,
    /// Optimistic concurrency counter, bumped on every stored update
    #[serde(default)]
    pub version: u64,
}

impl MemoryItem {
    /// Create a new active item with a fresh ULID and neutral importance.
    pub fn new(kind: ItemKind, content: impl Into<String>) -> Self {
        Self::with_id(Ulid::new().to_string(), kind, content)
    }

    /// Create a new active item with an explicit id.
    pub fn with_id(id: impl Into<String>, kind: ItemKind, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            content: content.into(),
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            importance: 0.5,
            links: BTreeSet::new(),
            status: ItemStatus::Active,
            status_changed_at: now,
            project_id: None,
            trigger_phrases: Vec::new(),
            version: 0,
        }
    }

    /// Set importance, clamped to [0.0, 1.0].
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    /// Set creation time. Also moves `last_accessed_at` and `status_changed_at`
    /// so a fresh item has never been touched after creation.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.last_accessed_at = created_at;
        self.status_changed_at = created_at;
        self
    }

    pub fn with_last_accessed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_accessed_at = at;
        self
    }

    pub fn with_access_count(mut self, count: u32) -> Self {
        self.access_count = count;
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_link(mut self, target_id: impl Into<String>) -> Self {
        self.links.insert(target_id.into());
        self
    }

    pub fn with_trigger_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.trigger_phrases.push(phrase.into());
        self
    }

    pub fn with_status(mut self, status: ItemStatus, changed_at: DateTime<Utc>) -> Self {
        self.status = status;
        self.status_changed_at = changed_at;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == ItemStatus::Active
    }

    pub fn is_deleted(&self) -> bool {
        self.status == ItemStatus::Deleted
    }

    /// The later of `created_at` and `last_accessed_at`; the recency anchor for decay.
    pub fn freshest_touch(&self) -> DateTime<Utc> {
        self.created_at.max(self.last_accessed_at)
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_forward_transitions() {
        assert_eq!(ItemStatus::Active.next(), Some(ItemStatus::Archived));
        assert_eq!(ItemStatus::Archived.next(), Some(ItemStatus::Deleted));
        assert_eq!(ItemStatus::Deleted.next(), None);
    }

    #[test]
    fn test_no_skipping_states() {
        assert!(!ItemStatus::Active.can_transition_to(ItemStatus::Deleted));
        assert!(!ItemStatus::Deleted.can_transition_to(ItemStatus::Active));
        assert!(ItemStatus::Active
            .transition_to(ItemStatus::Deleted)
            .is_err());
    }

    #[test]
    fn test_archive_only_from_active() {
        assert_eq!(ItemStatus::Active.archive().unwrap(), ItemStatus::Archived);
        assert!(ItemStatus::Deleted.archive().is_err());
        assert!(ItemStatus::Archived.archive().is_err());
        assert_eq!(ItemStatus::Archived.delete().unwrap(), ItemStatus::Deleted);
        assert!(ItemStatus::Active.delete().is_err());
    }

    #[test]
    fn test_restore() {
        assert_eq!(ItemStatus::Deleted.restore().unwrap(), ItemStatus::Archived);
        assert_eq!(ItemStatus::Archived.restore().unwrap(), ItemStatus::Active);
        assert!(ItemStatus::Active.restore().is_err());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ItemStatus::Archived).unwrap();
        assert_eq!(json, "\"archived\"");
        let kind = serde_json::to_string(&ItemKind::ProjectState).unwrap();
        assert_eq!(kind, "\"project_state\"");
    }

    #[test]
    fn test_new_item_defaults() {
        let item = MemoryItem::new(ItemKind::Decision, "Use RocksDB for storage");
        assert_eq!(item.status, ItemStatus::Active);
        assert_eq!(item.access_count, 0);
        assert_eq!(item.version, 0);
        assert_eq!(item.id.len(), 26);
        assert!(item.links.is_empty());
    }

    #[test]
    fn test_importance_clamped() {
        let item = MemoryItem::new(ItemKind::Learning, "x").with_importance(1.7);
        assert_eq!(item.importance, 1.0);
        let item = MemoryItem::new(ItemKind::Learning, "x").with_importance(-0.2);
        assert_eq!(item.importance, 0.0);
    }

    #[test]
    fn test_freshest_touch() {
        let created = Utc::now() - Duration::days(10);
        let item = MemoryItem::new(ItemKind::Episode, "x").with_created_at(created);
        assert_eq!(item.freshest_touch(), created);

        let touched = created + Duration::days(3);
        let item = item.with_last_accessed_at(touched);
        assert_eq!(item.freshest_touch(), touched);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let item = MemoryItem::new(ItemKind::Issue, "Flaky CI on arm64")
            .with_project("proj-1")
            .with_link("other")
            .with_trigger_phrase("flaky ci");
        let decoded = MemoryItem::from_bytes(&item.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, item);
    }
}
