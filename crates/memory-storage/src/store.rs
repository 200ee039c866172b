//! The `MemoryStore` abstraction shared by every engine.
//!
//! Engines never hold items themselves; they read pages through
//! [`MemoryStore::query_items`] and write back through conditional updates.
//! Every successful item update bumps `version`, and an update carrying
//! `expected_version` fails with [`StorageError::Conflict`] when another
//! writer got there first.

use chrono::{DateTime, Utc};
use memory_types::{EdgeStatus, ItemStatus, MemoryItem, SharpEdge};

use crate::error::StorageError;

/// Selection of items for a paged scan. Results are ordered by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemFilter {
    /// Statuses to include; `None` means all
    pub statuses: Option<Vec<ItemStatus>>,
    /// Only items owned by this project
    pub project_id: Option<String>,
    /// Exclusive lower bound on id, for paging
    pub after_id: Option<String>,
    /// Maximum number of items returned
    pub limit: Option<usize>,
}

impl ItemFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = ItemStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    pub fn in_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn after(mut self, id: impl Into<String>) -> Self {
        self.after_id = Some(id.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an item passes the status and project predicates.
    ///
    /// Paging bounds are applied by the store.
    pub fn matches(&self, item: &MemoryItem) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&item.status) {
                return false;
            }
        }
        if let Some(project) = &self.project_id {
            if item.project_id.as_ref() != Some(project) {
                return false;
            }
        }
        true
    }
}

/// Partial update of a stored item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemUpdate {
    pub access_count: Option<u32>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub status: Option<ItemStatus>,
    pub status_changed_at: Option<DateTime<Utc>>,
    /// Reject the update unless the stored version equals this
    pub expected_version: Option<u64>,
}

impl ItemUpdate {
    /// Record one more retrieval, conditional on the version that was read.
    pub fn access(item: &MemoryItem, now: DateTime<Utc>) -> Self {
        Self {
            access_count: Some(item.access_count.saturating_add(1)),
            last_accessed_at: Some(now),
            expected_version: Some(item.version),
            ..Default::default()
        }
    }

    /// Move to a new lifecycle status, conditional on the version that was read.
    pub fn transition(item: &MemoryItem, to: ItemStatus, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(to),
            status_changed_at: Some(now),
            expected_version: Some(item.version),
            ..Default::default()
        }
    }

    /// Apply to the current stored value, checking the expected version and
    /// bumping the stored one.
    ///
    /// A status change must be a single lifecycle step from the stored
    /// status; anything else fails with [`StorageError::Lifecycle`] and leaves
    /// the item untouched.
    pub fn apply(&self, mut item: MemoryItem) -> Result<MemoryItem, StorageError> {
        if let Some(expected) = self.expected_version {
            if expected != item.version {
                return Err(StorageError::Conflict {
                    id: item.id,
                    expected,
                    actual: item.version,
                });
            }
        }
        if let Some(status) = self.status {
            item.status = item.status.transition_to(status)?;
        }
        if let Some(count) = self.access_count {
            item.access_count = count;
        }
        if let Some(at) = self.last_accessed_at {
            item.last_accessed_at = at;
        }
        if let Some(at) = self.status_changed_at {
            item.status_changed_at = at;
        }
        item.version = item.version.wrapping_add(1);
        Ok(item)
    }
}

/// Partial update of a stored sharp edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeUpdate {
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub status: Option<EdgeStatus>,
    pub needs_review: Option<bool>,
}

impl EdgeUpdate {
    pub fn triggered(at: DateTime<Utc>) -> Self {
        Self {
            last_triggered_at: Some(at),
            ..Default::default()
        }
    }

    pub fn flag_for_review() -> Self {
        Self {
            needs_review: Some(true),
            ..Default::default()
        }
    }

    pub fn retire() -> Self {
        Self {
            status: Some(EdgeStatus::Retired),
            ..Default::default()
        }
    }

    pub fn apply(&self, mut edge: SharpEdge) -> SharpEdge {
        if let Some(at) = self.last_triggered_at {
            edge.last_triggered_at = Some(at);
        }
        if let Some(status) = self.status {
            edge.status = status;
        }
        if let Some(flag) = self.needs_review {
            edge.needs_review = flag;
        }
        edge
    }
}

/// Persistent home of memory items and sharp edges.
///
/// `update_item` must be atomic per item: the version check and the write
/// happen under the same lock.
pub trait MemoryStore: Send + Sync {
    /// Insert or replace an item as-is.
    fn put_item(&self, item: &MemoryItem) -> Result<(), StorageError>;

    fn get_item(&self, id: &str) -> Result<Option<MemoryItem>, StorageError>;

    /// One page of matching items ordered by id.
    fn query_items(&self, filter: &ItemFilter) -> Result<Vec<MemoryItem>, StorageError>;

    /// Apply a partial update and return the stored result.
    fn update_item(&self, id: &str, update: &ItemUpdate) -> Result<MemoryItem, StorageError>;

    /// Insert or replace an edge as-is.
    fn put_edge(&self, edge: &SharpEdge) -> Result<(), StorageError>;

    fn get_edge(&self, id: &str) -> Result<Option<SharpEdge>, StorageError>;

    /// Every stored edge ordered by id.
    fn list_edges(&self) -> Result<Vec<SharpEdge>, StorageError>;

    fn update_edge(&self, id: &str, update: &EdgeUpdate) -> Result<SharpEdge, StorageError>;
}
