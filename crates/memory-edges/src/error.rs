//! Edge detection error types.

use memory_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Sharp edge not found: {0}")]
    NotFound(String),
}
