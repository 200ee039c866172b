//! # memory-retrieval
//!
//! Context engine for the agent-memory core.
//!
//! Given a query, the engine returns the most relevant memory items by
//! combining two tiers:
//!
//! - **Trigger tier**: active items whose registered trigger phrases occur in
//!   the query. These always rank above semantic matches.
//! - **Semantic tier**: nearest neighbours from the vector index, scored by
//!   the product of similarity, recency, frequency, relation and importance
//!   weights (see [`memory_types::weights`]).
//!
//! Every returned item has its access recorded, which feeds the frequency
//! and recency weights of later queries and the decay sweep.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let engine = ContextEngine::from_settings(store, index, &settings);
//! let query = ContextQuery::new("why did we pick rocksdb?")
//!     .with_project("agent-memory")
//!     .embed_with(model.as_ref());
//! let results = engine.get_relevant_context(&query, Utc::now())?;
//! ```

pub mod engine;
pub mod error;
pub mod query;
pub mod scoring;
pub mod trigger;

pub use engine::ContextEngine;
pub use error::RetrievalError;
pub use query::{ContextQuery, ScoreBreakdown, ScoredItem, Tier};
pub use trigger::{normalize, TriggerMatcher};
