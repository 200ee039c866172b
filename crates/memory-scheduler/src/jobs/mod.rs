//! Predefined jobs.
//!
//! - **decay**: nightly salience decay over every active and archived item

pub mod decay;

pub use decay::{create_decay_job, run_decay_job, DecayJobConfig};
