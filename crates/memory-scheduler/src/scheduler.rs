//! Cron scheduling for memory maintenance.
//!
//! [`SchedulerService`] owns a `JobScheduler`, keeps one job per name and
//! runs every tick inside a [`TaskTracker`], so shutdown can wait for an
//! in-flight decay pass instead of cutting it off mid-page.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono_tz::Tz;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{SchedulerConfig, SchedulerError};

/// Check a 6-field cron expression (`sec min hour day-of-month month day-of-week`).
///
/// ```
/// use memory_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 0 3 * * *").is_ok());
/// assert!(validate_cron_expression("nightly").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    Job::new_async(expr, |_uuid, _lock| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron(format!("'{expr}': {e}")))
}

pub struct SchedulerService {
    inner: JobScheduler,
    config: SchedulerConfig,
    jobs: Mutex<HashMap<String, Uuid>>,
    cancel: CancellationToken,
    in_flight: TaskTracker,
    started: AtomicBool,
}

impl SchedulerService {
    /// Build a stopped scheduler. The configuration is validated here so a
    /// bad timezone fails at startup rather than at first registration.
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self {
            inner: JobScheduler::new().await?,
            config,
            jobs: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            in_flight: TaskTracker::new(),
            started: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.inner.start().await?;
        info!(jobs = self.jobs.lock().await.len(), "Scheduler started");
        Ok(())
    }

    /// Cancel the shutdown token, give running ticks up to
    /// `shutdown_timeout_secs` to finish, then stop the scheduler.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!(in_flight = self.in_flight.len(), "Stopping scheduler");
        self.cancel.cancel();
        self.in_flight.close();

        let grace = self.config.shutdown_timeout();
        if tokio::time::timeout(grace, self.in_flight.wait()).await.is_err() {
            warn!(
                timeout_secs = grace.as_secs(),
                in_flight = self.in_flight.len(),
                "Jobs still running at shutdown timeout"
            );
        }

        if let Err(e) = self.inner.shutdown().await {
            warn!(error = %e, "Scheduler did not stop cleanly");
        }
        self.started.store(false, Ordering::SeqCst);
        info!("Scheduler stopped");
        Ok(())
    }

    /// Cancelled once shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Names of the registered jobs, sorted.
    pub async fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Register `job_fn` under `name`, replacing any job already using the name.
    ///
    /// `timezone` falls back to the configured one. Ticks that fire after
    /// shutdown has begun do nothing.
    pub async fn add_cron_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        job_fn: F,
    ) -> Result<Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let tz = match timezone {
            Some(tz) => Self::parse_timezone(tz)?,
            None => self.config.timezone()?,
        };
        validate_cron_expression(cron_expr)?;

        let job = {
            let name = name.to_string();
            let cancel = self.cancel.clone();
            let tracker = self.in_flight.clone();
            Job::new_async_tz(cron_expr, tz, move |_uuid, _lock| {
                let name = name.clone();
                let cancel = cancel.clone();
                let job_fn = job_fn.clone();
                Box::pin(tracker.track_future(async move {
                    if cancel.is_cancelled() {
                        debug!(job = %name, "Tick after shutdown ignored");
                        return;
                    }
                    let started = Instant::now();
                    job_fn(cancel).await;
                    info!(job = %name, duration_ms = started.elapsed().as_millis(), "Job finished");
                }))
            })
            .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?
        };

        let mut jobs = self.jobs.lock().await;
        if let Some(previous) = jobs.remove(name) {
            self.inner.remove(&previous).await?;
            debug!(job = %name, uuid = %previous, "Replaced existing job");
        }
        let uuid = self.inner.add(job).await?;
        jobs.insert(name.to_string(), uuid);
        info!(
            job = %name,
            uuid = %uuid,
            cron = %cron_expr,
            timezone = %tz.name(),
            "Job registered"
        );
        Ok(uuid)
    }

    /// Unschedule a job by name. Returns whether it existed.
    pub async fn remove_job(&self, name: &str) -> Result<bool, SchedulerError> {
        let Some(uuid) = self.jobs.lock().await.remove(name) else {
            return Ok(false);
        };
        self.inner.remove(&uuid).await?;
        info!(job = %name, "Job removed");
        Ok(true)
    }

    pub fn parse_timezone(name: &str) -> Result<Tz, SchedulerError> {
        name.parse()
            .map_err(|_| SchedulerError::InvalidTimezone(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use std::time::Duration;

    fn quick() -> SchedulerConfig {
        SchedulerConfig {
            shutdown_timeout_secs: 2,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_and_shutdown_once() {
        let mut scheduler = SchedulerService::new(quick()).await.unwrap();
        assert!(!scheduler.is_running());

        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(scheduler.start().await, Err(SchedulerError::AlreadyRunning)));

        let token = scheduler.shutdown_token();
        scheduler.shutdown().await.unwrap();
        assert!(!scheduler.is_running());
        assert!(token.is_cancelled());
        assert!(matches!(scheduler.shutdown().await, Err(SchedulerError::NotRunning)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bad_timezone_rejected_at_construction() {
        let config = SchedulerConfig {
            timezone: "Nowhere/Land".to_string(),
            ..Default::default()
        };
        let result = SchedulerService::new(config).await;
        assert!(matches!(result, Err(SchedulerError::InvalidTimezone(_))));
    }

    #[test]
    fn test_cron_validation() {
        for ok in ["0 0 3 * * *", "*/10 * * * * *", "0 0 0 * * SUN"] {
            assert!(validate_cron_expression(ok).is_ok(), "{ok}");
        }
        for bad in ["invalid", "", "* * *"] {
            assert!(validate_cron_expression(bad).is_err(), "{bad}");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_job_fires() {
        let mut scheduler = SchedulerService::new(quick()).await.unwrap();
        let ticks = Arc::new(AtomicU32::new(0));
        let seen = ticks.clone();

        scheduler
            .add_cron_job("tick", "*/1 * * * * *", None, move |_cancel| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        scheduler.shutdown().await.unwrap();

        assert!(ticks.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_registration_errors() {
        let scheduler = SchedulerService::new(SchedulerConfig::default()).await.unwrap();

        let bad_cron = scheduler
            .add_cron_job("bad-cron", "whenever", None, |_| async {})
            .await;
        assert!(matches!(bad_cron, Err(SchedulerError::InvalidCron(_))));

        let bad_tz = scheduler
            .add_cron_job("bad-tz", "0 0 * * * *", Some("Invalid/Timezone"), |_| async {})
            .await;
        assert!(matches!(bad_tz, Err(SchedulerError::InvalidTimezone(_))));
        assert!(scheduler.job_names().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_same_name_replaces_job() {
        let scheduler = SchedulerService::new(SchedulerConfig::default()).await.unwrap();

        let first = scheduler
            .add_cron_job("nightly", "0 0 3 * * *", None, |_| async {})
            .await
            .unwrap();
        let second = scheduler
            .add_cron_job("nightly", "0 30 2 * * *", Some("Europe/Berlin"), |_| async {})
            .await
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(scheduler.job_names().await, vec!["nightly".to_string()]);

        assert!(scheduler.remove_job("nightly").await.unwrap());
        assert!(!scheduler.remove_job("nightly").await.unwrap());
        assert!(scheduler.job_names().await.is_empty());
    }
}
