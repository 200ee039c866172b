//! Scheduler settings.

use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::SchedulerError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// IANA name used for jobs registered without their own timezone
    pub timezone: String,

    /// Upper bound on how long shutdown waits for running jobs
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            shutdown_timeout_secs: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn timezone(&self) -> Result<Tz, SchedulerError> {
        self.timezone
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(self.timezone.clone()))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        self.timezone().map(|_| ())
    }
}
