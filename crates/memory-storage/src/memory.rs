//! In-process store backed by concurrent maps.
//!
//! Used for tests and for embedding the engines without a database. Item
//! updates hold the map shard's write guard across the version check and
//! the write, which makes them atomic per item.

use dashmap::DashMap;
use memory_types::{MemoryItem, SharpEdge};

use crate::error::StorageError;
use crate::store::{EdgeUpdate, ItemFilter, ItemUpdate, MemoryStore};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: DashMap<String, MemoryItem>,
    edges: DashMap<String, SharpEdge>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

impl MemoryStore for InMemoryStore {
    fn put_item(&self, item: &MemoryItem) -> Result<(), StorageError> {
        self.items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    fn get_item(&self, id: &str) -> Result<Option<MemoryItem>, StorageError> {
        Ok(self.items.get(id).map(|entry| entry.value().clone()))
    }

    fn query_items(&self, filter: &ItemFilter) -> Result<Vec<MemoryItem>, StorageError> {
        let mut matched: Vec<MemoryItem> = self
            .items
            .iter()
            .filter(|entry| match &filter.after_id {
                Some(after) => entry.key().as_str() > after.as_str(),
                None => true,
            })
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        matched.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn update_item(&self, id: &str, update: &ItemUpdate) -> Result<MemoryItem, StorageError> {
        let mut entry = self
            .items
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        let updated = update.apply(entry.value().clone())?;
        *entry.value_mut() = updated.clone();
        Ok(updated)
    }

    fn put_edge(&self, edge: &SharpEdge) -> Result<(), StorageError> {
        self.edges.insert(edge.id.clone(), edge.clone());
        Ok(())
    }

    fn get_edge(&self, id: &str) -> Result<Option<SharpEdge>, StorageError> {
        Ok(self.edges.get(id).map(|entry| entry.value().clone()))
    }

    fn list_edges(&self) -> Result<Vec<SharpEdge>, StorageError> {
        let mut edges: Vec<SharpEdge> = self
            .edges
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(edges)
    }

    fn update_edge(&self, id: &str, update: &EdgeUpdate) -> Result<SharpEdge, StorageError> {
        let mut entry = self
            .edges
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        let updated = update.apply(entry.value().clone());
        *entry.value_mut() = updated.clone();
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;
    use chrono::Utc;
    use memory_types::ItemKind;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_put_get_roundtrip() {
        conformance::put_get_roundtrip(&InMemoryStore::new());
    }

    #[test]
    fn test_query_pages_in_id_order() {
        conformance::query_pages_in_id_order(&InMemoryStore::new());
    }

    #[test]
    fn test_query_filters_by_project() {
        conformance::query_filters_by_project(&InMemoryStore::new());
    }

    #[test]
    fn test_update_bumps_version_and_detects_conflict() {
        conformance::update_bumps_version_and_detects_conflict(&InMemoryStore::new());
    }

    #[test]
    fn test_status_moves_follow_lifecycle() {
        conformance::status_moves_follow_lifecycle(&InMemoryStore::new());
    }

    #[test]
    fn test_edge_crud() {
        conformance::edge_crud(&InMemoryStore::new());
    }

    #[test]
    fn test_concurrent_conditional_updates_lose_nothing() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_item(&MemoryItem::with_id("hot", ItemKind::Learning, "x"))
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..50 {
                        loop {
                            let current = store.get_item("hot").unwrap().unwrap();
                            let update = ItemUpdate::access(&current, Utc::now());
                            match store.update_item("hot", &update) {
                                Ok(_) => break,
                                Err(e) if e.is_conflict() => continue,
                                Err(e) => panic!("unexpected error: {e}"),
                            }
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let item = store.get_item("hot").unwrap().unwrap();
        assert_eq!(item.access_count, 400);
        assert_eq!(item.version, 400);
    }
}
