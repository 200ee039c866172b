//! End-to-end test infrastructure for the agent-memory core.
//!
//! [`TestHarness`] wires the three engines to one RocksDB store and one
//! in-memory vector index, the way a host process would. [`ContendedStore`]
//! wraps a store and loses conditional updates on demand.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use chrono::{DateTime, Duration, Utc};

use memory_edges::EdgeDetector;
use memory_lifecycle::DecayEngine;
use memory_retrieval::ContextEngine;
use memory_storage::{EdgeUpdate, ItemFilter, ItemUpdate, MemoryStore, Storage, StorageError};
use memory_types::{MemoryItem, Settings, SharpEdge};
use memory_vector::{Embedding, EmbeddingModel, FlatIndex, VectorError, VectorIndex};

pub const TEST_DIMENSION: usize = 16;

static TRACING: Once = Once::new();

/// Install a test subscriber once per process. `RUST_LOG` overrides the
/// default `warn` level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub storage: Arc<Storage>,
    pub index: Arc<FlatIndex>,
    pub context: ContextEngine,
    pub decay: Arc<DecayEngine>,
    pub edges: EdgeDetector,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(&Settings::default())
    }

    pub fn with_settings(settings: &Settings) -> Self {
        init_tracing();
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let settings = Settings {
            db_path: temp_dir.path().join("db").to_string_lossy().to_string(),
            ..settings.clone()
        };
        let storage =
            Arc::new(Storage::from_settings(&settings).expect("Failed to open test storage"));
        let index = Arc::new(FlatIndex::new(TEST_DIMENSION));

        let context = ContextEngine::from_settings(storage.clone(), index.clone(), &settings);
        let decay = Arc::new(DecayEngine::from_settings(storage.clone(), &settings));
        let edges = EdgeDetector::from_settings(storage.clone(), &settings);

        Self {
            _temp_dir: temp_dir,
            storage,
            index,
            context,
            decay,
            edges,
        }
    }

    /// Store an item and, when given, index its embedding.
    pub fn remember(&self, item: &MemoryItem, embedding: Option<&Embedding>) {
        self.storage.put_item(item).expect("Failed to put item");
        if let Some(embedding) = embedding {
            self.index
                .upsert(&item.id, embedding)
                .expect("Failed to index item");
        }
    }

    pub fn item(&self, id: &str) -> MemoryItem {
        self.storage
            .get_item(id)
            .expect("Failed to read item")
            .unwrap_or_else(|| panic!("item {id} missing"))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Store wrapper whose next conditional item updates fail with
/// [`StorageError::Conflict`].
///
/// With a rival set, each lost update is preceded by a real access recorded
/// on the inner store at the rival's timestamp, as if another caller had
/// read the item in between.
pub struct ContendedStore {
    inner: Arc<dyn MemoryStore>,
    conflicts: AtomicUsize,
    rival_access: Option<DateTime<Utc>>,
}

impl ContendedStore {
    pub fn new(inner: Arc<dyn MemoryStore>, conflicts: usize) -> Self {
        Self {
            inner,
            conflicts: AtomicUsize::new(conflicts),
            rival_access: None,
        }
    }

    pub fn with_rival_access(mut self, at: DateTime<Utc>) -> Self {
        self.rival_access = Some(at);
        self
    }

    /// Conflicts still waiting to be injected.
    pub fn remaining(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }

    fn take_conflict(&self) -> bool {
        self.conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl MemoryStore for ContendedStore {
    fn put_item(&self, item: &MemoryItem) -> Result<(), StorageError> {
        self.inner.put_item(item)
    }

    fn get_item(&self, id: &str) -> Result<Option<MemoryItem>, StorageError> {
        self.inner.get_item(id)
    }

    fn query_items(&self, filter: &ItemFilter) -> Result<Vec<MemoryItem>, StorageError> {
        self.inner.query_items(filter)
    }

    fn update_item(&self, id: &str, update: &ItemUpdate) -> Result<MemoryItem, StorageError> {
        let Some(expected) = update.expected_version else {
            return self.inner.update_item(id, update);
        };
        if !self.take_conflict() {
            return self.inner.update_item(id, update);
        }

        let mut actual = expected.wrapping_add(1);
        if let Some(at) = self.rival_access {
            let current = self
                .inner
                .get_item(id)?
                .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
            actual = self
                .inner
                .update_item(id, &ItemUpdate::access(&current, at))?
                .version;
        }
        Err(StorageError::Conflict {
            id: id.to_string(),
            expected,
            actual,
        })
    }

    fn put_edge(&self, edge: &SharpEdge) -> Result<(), StorageError> {
        self.inner.put_edge(edge)
    }

    fn get_edge(&self, id: &str) -> Result<Option<SharpEdge>, StorageError> {
        self.inner.get_edge(id)
    }

    fn list_edges(&self) -> Result<Vec<SharpEdge>, StorageError> {
        self.inner.list_edges()
    }

    fn update_edge(&self, id: &str, update: &EdgeUpdate) -> Result<SharpEdge, StorageError> {
        self.inner.update_edge(id, update)
    }
}

/// Unit vector along `axis`.
pub fn axis(axis: usize) -> Embedding {
    let mut values = vec![0.0; TEST_DIMENSION];
    values[axis] = 1.0;
    Embedding::new(values)
}

/// Unit vector whose cosine similarity with `axis(0)` is `similarity`.
pub fn at_similarity(similarity: f32) -> Embedding {
    let mut values = vec![0.0; TEST_DIMENSION];
    values[0] = similarity;
    values[1] = (1.0 - similarity * similarity).max(0.0).sqrt();
    Embedding::new(values)
}

/// Deterministic bag-of-words embedder: each word adds to one hashed bucket.
pub struct HashEmbedder;

impl EmbeddingModel for HashEmbedder {
    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    fn embed(&self, text: &str) -> Result<Embedding, VectorError> {
        let mut values = vec![0.0f32; TEST_DIMENSION];
        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            values[(hasher.finish() as usize) % TEST_DIMENSION] += 1.0;
        }
        if values.iter().all(|v| *v == 0.0) {
            return Err(VectorError::Embedding("no words to embed".to_string()));
        }
        Ok(Embedding::new(values))
    }
}

pub fn days_ago(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}
