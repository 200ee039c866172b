//! # memory-types
//!
//! Shared domain types for the agent-memory core.
//!
//! This crate defines the data structures used by every other crate:
//! - Memory items and their Active -> Archived -> Deleted lifecycle
//! - Sharp edges, detection patterns and warnings
//! - Pure weight functions used by ranking and decay
//! - Layered settings
//!
//! ## Usage
//!
//! ```rust
//! use memory_types::{ItemKind, MemoryItem};
//!
//! let item = MemoryItem::new(ItemKind::Decision, "Store items in RocksDB")
//!     .with_importance(0.8);
//! assert!(item.is_active());
//! ```

pub mod config;
pub mod error;
pub mod item;
pub mod sharp_edge;
pub mod weights;

pub use config::{ContextConfig, DecayConfig, EdgeConfig, Settings, WeightConfig};
pub use error::MemoryError;
pub use item::{ItemKind, ItemStatus, MemoryItem};
pub use sharp_edge::{
    ContextPredicate, DetectionPattern, EdgeStatus, Expectation, PatternKind, Severity,
    SharpEdge, Warning,
};
