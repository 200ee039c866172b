//! # memory-edges
//!
//! Sharp-edge detection for the agent-memory core.
//!
//! A sharp edge is a known hazard with a workaround. [`EdgeDetector`]
//! matches proposed code, the stated intent and a context mapping against
//! each active edge's detection patterns and returns at most one
//! [`Warning`](memory_types::Warning) per edge:
//!
//! | Pattern   | Matches when                         | Severity |
//! |-----------|--------------------------------------|----------|
//! | `code`    | its regex matches the code           | high     |
//! | `context` | every key/value predicate holds      | medium   |
//! | `intent`  | any term appears in the intent       | low      |

pub mod detector;
pub mod error;
pub mod fuzzy;
pub mod pattern;

pub use detector::EdgeDetector;
pub use error::EdgeError;
pub use pattern::{CompiledPattern, EdgeInput};
