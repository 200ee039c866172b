//! # memory-scheduler
//!
//! Runs the decay sweep on a cron schedule.
//!
//! [`SchedulerService`] wraps `tokio-cron-scheduler` with timezone-aware
//! registration and graceful shutdown. [`jobs::create_decay_job`] registers a
//! [`memory_lifecycle::DecayEngine`] pass at the configured schedule.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//! create_decay_job(&scheduler, engine, DecayJobConfig::from(&settings.decay)).await?;
//! scheduler.start().await?;
//! ```

pub mod config;
pub mod error;
pub mod jobs;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use jobs::{create_decay_job, run_decay_job, DecayJobConfig};
pub use scheduler::{validate_cron_expression, SchedulerService};
