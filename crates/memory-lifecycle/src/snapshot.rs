//! Link snapshot taken before each decay round.
//!
//! Protection and link bonuses are judged against the state at the start of
//! a round, never against transitions made earlier in the same round, so the
//! outcome does not depend on the order items are visited.

use std::collections::HashSet;

use memory_storage::{ItemFilter, MemoryStore, StorageError};
use memory_types::{ItemStatus, MemoryItem};

#[derive(Debug, Clone, Default)]
pub struct LinkSnapshot {
    /// Ids of every active item
    active: HashSet<String>,
    /// Ids named in the links of some other active item
    linked_from_active: HashSet<String>,
}

impl LinkSnapshot {
    /// Scan active items page by page.
    pub fn build(store: &dyn MemoryStore, page_size: usize) -> Result<Self, StorageError> {
        let mut snapshot = Self::default();
        let mut filter = ItemFilter::all()
            .with_statuses([ItemStatus::Active])
            .limit(page_size.max(1));

        loop {
            let page = store.query_items(&filter)?;
            let Some(last) = page.last() else {
                break;
            };
            filter.after_id = Some(last.id.clone());
            let full = page.len() == page_size.max(1);

            for item in &page {
                snapshot.add_active(item);
            }
            if !full {
                break;
            }
        }
        Ok(snapshot)
    }

    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a MemoryItem>) -> Self {
        let mut snapshot = Self::default();
        for item in items.into_iter().filter(|item| item.is_active()) {
            snapshot.add_active(item);
        }
        snapshot
    }

    fn add_active(&mut self, item: &MemoryItem) {
        self.active.insert(item.id.clone());
        self.linked_from_active.extend(
            item.links
                .iter()
                .filter(|target| **target != item.id)
                .cloned(),
        );
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.contains(id)
    }

    /// Referenced by at least one other active item.
    pub fn is_protected(&self, id: &str) -> bool {
        self.linked_from_active.contains(id)
    }

    /// Any of the item's link targets is active.
    pub fn has_active_link(&self, item: &MemoryItem) -> bool {
        item.links
            .iter()
            .any(|target| *target != item.id && self.active.contains(target))
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
