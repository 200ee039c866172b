//! # memory-lifecycle
//!
//! Salience-based decay for the agent-memory core.
//!
//! [`DecayEngine`] periodically walks every active and archived item, scores
//! its salience and moves it one step along
//! `active -> archived -> deleted`. Deleted is a soft state:
//! [`DecayEngine::restore`] steps an item back.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let engine = DecayEngine::from_settings(store, &settings);
//! let report = engine.run_decay_pass(Utc::now())?;
//! println!("archived {:?}, deleted {:?}", report.archived, report.deleted);
//! ```

pub mod decay;
pub mod error;
pub mod snapshot;

pub use decay::{DecayEngine, DecayReport};
pub use error::LifecycleError;
pub use snapshot::LinkSnapshot;
