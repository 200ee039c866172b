//! Storage layer for the agent-memory core.
//!
//! Provides the [`MemoryStore`] trait and two backends:
//! - [`Storage`]: RocksDB with one column family per record type
//! - [`InMemoryStore`]: concurrent maps, for tests and embedding
//!
//! Both backends make each conditional update atomic per item: a stale
//! `expected_version` fails with [`StorageError::Conflict`] and writes
//! nothing. Callers decide whether to retry; the context engine retries an
//! access increment once and then drops it.

pub mod column_families;
pub mod db;
pub mod error;
pub mod memory;
pub mod store;

pub use db::{Storage, StorageStats};
pub use error::StorageError;
pub use memory::InMemoryStore;
pub use store::{EdgeUpdate, ItemFilter, ItemUpdate, MemoryStore};
