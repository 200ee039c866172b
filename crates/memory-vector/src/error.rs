//! Vector index error types.

use thiserror::Error;

/// Errors that can occur during vector operations.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Backend index error
    #[error("Index error: {0}")]
    Index(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Index cannot serve queries right now
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),
}
