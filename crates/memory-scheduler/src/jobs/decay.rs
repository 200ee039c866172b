//! Periodic decay sweep.
//!
//! The pass itself is synchronous storage work, so each run is moved onto the
//! blocking pool. A run that fires while the previous sweep still holds the
//! engine's sweep lock is skipped, not queued.

use std::sync::Arc;

use chrono::Utc;
use memory_lifecycle::{DecayEngine, DecayReport};
use memory_types::DecayConfig;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{SchedulerError, SchedulerService};

const JOB_NAME: &str = "memory_decay";

/// Schedule for the decay job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayJobConfig {
    /// Cron expression (default: "0 0 3 * * *" = 3 AM daily)
    pub cron: String,

    /// Timezone (default: "UTC")
    pub timezone: String,
}

impl Default for DecayJobConfig {
    fn default() -> Self {
        Self::from(&DecayConfig::default())
    }
}

impl From<&DecayConfig> for DecayJobConfig {
    fn from(config: &DecayConfig) -> Self {
        Self {
            cron: config.cron_schedule.clone(),
            timezone: "UTC".to_string(),
        }
    }
}

/// Run one decay pass off the async runtime.
///
/// Returns `None` when another sweep was already running.
pub async fn run_decay_job(
    engine: Arc<DecayEngine>,
) -> Result<Option<DecayReport>, SchedulerError> {
    let report = tokio::task::spawn_blocking(move || engine.try_run_decay_pass(Utc::now())).await??;
    Ok(report)
}

/// Register the decay job with the scheduler.
///
/// Returns `None` without registering anything when decay is disabled in the
/// engine's configuration.
///
/// # Errors
///
/// Returns error if the cron expression or timezone is invalid.
pub async fn create_decay_job(
    scheduler: &SchedulerService,
    engine: Arc<DecayEngine>,
    config: DecayJobConfig,
) -> Result<Option<uuid::Uuid>, SchedulerError> {
    if !engine.config().enabled {
        info!("Decay disabled, job not registered");
        return Ok(None);
    }

    let uuid = scheduler
        .add_cron_job(JOB_NAME, &config.cron, Some(&config.timezone), move |_token| {
            let engine = engine.clone();
            async move {
                match run_decay_job(engine).await {
                    Ok(Some(report)) => info!(
                        archived = report.archived.len(),
                        deleted = report.deleted.len(),
                        protected = report.protected.len(),
                        scanned = report.scanned,
                        rounds = report.rounds,
                        "Decay pass finished"
                    ),
                    Ok(None) => info!("Previous decay pass still running, skipped"),
                    Err(e) => error!(error = %e, "Decay pass failed"),
                }
            }
        })
        .await?;

    Ok(Some(uuid))
}
