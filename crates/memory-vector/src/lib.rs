//! # memory-vector
//!
//! Embeddings and nearest-neighbour search for the agent-memory core.
//!
//! - [`Embedding`]: unit-length vector with cosine similarity
//! - [`EmbeddingModel`]: text to embedding, supplied by the host
//! - [`VectorIndex`]: k-NN search keyed by memory item id
//! - [`FlatIndex`]: exact in-process implementation

pub mod embedding;
pub mod error;
pub mod flat;
pub mod index;

pub use embedding::{Embedding, EmbeddingModel};
pub use error::VectorError;
pub use flat::FlatIndex;
pub use index::{SearchResult, VectorIndex};
