//! Durable [`MemoryStore`] on RocksDB.
//!
//! Items and sharp edges live in their own column families as JSON keyed by
//! id, so a forward iterator yields them in id order and `after_id` paging is
//! a seek. Conditional updates run their read-check-write under one lock.

use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, DB};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use memory_types::{MemoryItem, Settings, SharpEdge};

use crate::column_families::{build_cf_descriptors, ALL_CF_NAMES, CF_ITEMS, CF_SHARP_EDGES};
use crate::error::StorageError;
use crate::store::{EdgeUpdate, ItemFilter, ItemUpdate, MemoryStore};

pub struct Storage {
    db: DB,
    /// Serializes read-check-write cycles
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!(path = %path.display(), "Opening memory store");

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_background_jobs(4);

        let db = DB::open_cf_descriptors(&opts, path, build_cf_descriptors())?;
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Open the database at the configured `db_path`, with `~/` expanded.
    pub fn from_settings(settings: &Settings) -> Result<Self, StorageError> {
        Self::open(&settings.expanded_db_path())
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        // The guarded unit carries no data, so a poisoned lock is still usable
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Raw write into a column family.
    pub fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        Ok(self.db.put_cf(self.cf(cf_name)?, key, value)?)
    }

    /// Raw read from a column family.
    pub fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db.get_cf(self.cf(cf_name)?, key)?)
    }

    /// Scan a column family in key order, starting strictly after `after`.
    ///
    /// `accept` decides which decoded values are kept; the scan stops once
    /// `limit` values were accepted.
    fn scan_after<T, F>(
        &self,
        cf_name: &str,
        after: Option<&str>,
        limit: Option<usize>,
        decode: fn(&[u8]) -> Result<T, serde_json::Error>,
        accept: F,
    ) -> Result<Vec<T>, StorageError>
    where
        F: Fn(&T) -> bool,
    {
        let cf = self.cf(cf_name)?;
        let mode = match after {
            Some(start) => IteratorMode::From(start.as_bytes(), Direction::Forward),
            None => IteratorMode::Start,
        };

        let mut results = Vec::new();
        for entry in self.db.iterator_cf(cf, mode) {
            let (key, value) = entry?;
            if let Some(start) = after {
                if key.as_ref() == start.as_bytes() {
                    continue;
                }
            }
            let decoded = decode(&value)?;
            if accept(&decoded) {
                results.push(decoded);
                if limit.is_some_and(|limit| results.len() >= limit) {
                    break;
                }
            }
        }
        Ok(results)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            self.db.flush_cf(self.cf(cf_name)?)?;
        }
        debug!("Flushed memory store");
        Ok(())
    }

    /// Entry counts per column family plus on-disk size.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            item_count: self.count_entries(CF_ITEMS)?,
            edge_count: self.count_entries(CF_SHARP_EDGES)?,
            disk_usage_bytes: self.disk_usage(),
        })
    }

    fn count_entries(&self, cf_name: &str) -> Result<u64, StorageError> {
        self.db
            .iterator_cf(self.cf(cf_name)?, IteratorMode::Start)
            .try_fold(0u64, |count, entry| entry.map(|_| count + 1))
            .map_err(StorageError::from)
    }

    /// Best effort: unreadable directory entries count as zero bytes.
    fn disk_usage(&self) -> u64 {
        std::fs::read_dir(self.db.path())
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|entry| entry.metadata().ok())
                    .map(|metadata| metadata.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}

impl MemoryStore for Storage {
    fn put_item(&self, item: &MemoryItem) -> Result<(), StorageError> {
        let bytes = item.to_bytes()?;
        self.put(CF_ITEMS, item.id.as_bytes(), &bytes)?;
        debug!(item_id = %item.id, "Stored item");
        Ok(())
    }

    fn get_item(&self, id: &str) -> Result<Option<MemoryItem>, StorageError> {
        match self.get(CF_ITEMS, id.as_bytes())? {
            Some(bytes) => Ok(Some(MemoryItem::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn query_items(&self, filter: &ItemFilter) -> Result<Vec<MemoryItem>, StorageError> {
        self.scan_after(
            CF_ITEMS,
            filter.after_id.as_deref(),
            filter.limit,
            MemoryItem::from_bytes,
            |item| filter.matches(item),
        )
    }

    fn update_item(&self, id: &str, update: &ItemUpdate) -> Result<MemoryItem, StorageError> {
        let _guard = self.lock_writes();
        let current = self
            .get_item(id)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        let updated = update.apply(current)?;
        self.put(CF_ITEMS, id.as_bytes(), &updated.to_bytes()?)?;
        Ok(updated)
    }

    fn put_edge(&self, edge: &SharpEdge) -> Result<(), StorageError> {
        let bytes = edge.to_bytes()?;
        self.put(CF_SHARP_EDGES, edge.id.as_bytes(), &bytes)?;
        debug!(edge_id = %edge.id, "Stored sharp edge");
        Ok(())
    }

    fn get_edge(&self, id: &str) -> Result<Option<SharpEdge>, StorageError> {
        match self.get(CF_SHARP_EDGES, id.as_bytes())? {
            Some(bytes) => Ok(Some(SharpEdge::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn list_edges(&self) -> Result<Vec<SharpEdge>, StorageError> {
        self.scan_after(CF_SHARP_EDGES, None, None, SharpEdge::from_bytes, |_| true)
    }

    fn update_edge(&self, id: &str, update: &EdgeUpdate) -> Result<SharpEdge, StorageError> {
        let _guard = self.lock_writes();
        let current = self
            .get_edge(id)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        let updated = update.apply(current);
        self.put(CF_SHARP_EDGES, id.as_bytes(), &updated.to_bytes()?)?;
        Ok(updated)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Items in any status
    pub item_count: u64,
    pub edge_count: u64,
    pub disk_usage_bytes: u64,
}
