//! Lifecycle error types.

use memory_storage::StorageError;
use memory_types::MemoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Restore requested for an unknown item
    #[error("Item not found: {0}")]
    NotFound(String),

    /// Restore requested from a status with no predecessor
    #[error(transparent)]
    Memory(#[from] MemoryError),
}
