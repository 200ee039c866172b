//! Retrieval error types.

use memory_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the context engine.
///
/// Index outages and update conflicts are recovered inside the engine; only
/// a failing item store makes a call fail.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
