//! Job status notifications.
//!
//! Reporting is fire-and-forget: a reporter that fails only logs, and the
//! run carries on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

use forecast_common::ForecastResult;

use crate::report::{RunReport, RunStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Succeeded,
    Partial,
    Skipped,
    Failed,
}

impl From<RunStatus> for JobState {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Ok => JobState::Succeeded,
            RunStatus::Partial => JobState::Partial,
            RunStatus::Skipped => JobState::Skipped,
            RunStatus::Error => JobState::Failed,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Partial => "partial",
            JobState::Skipped => "skipped",
            JobState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Receives job state changes.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, job_id: Uuid, state: JobState, message: &str) -> ForecastResult<()>;
}

/// Writes state changes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatusReporter;

#[async_trait]
impl StatusReporter for TracingStatusReporter {
    async fn report(&self, job_id: Uuid, state: JobState, message: &str) -> ForecastResult<()> {
        info!(job_id = %job_id, state = %state, message, "Job status");
        Ok(())
    }
}

/// Report a state change, logging instead of failing.
pub async fn notify(reporter: &dyn StatusReporter, job_id: Uuid, state: JobState, message: &str) {
    if let Err(e) = reporter.report(job_id, state, message).await {
        warn!(job_id = %job_id, state = %state, error = %e, "Status report failed");
    }
}

/// Report the final state of a run.
pub async fn notify_finished(reporter: &dyn StatusReporter, report: &RunReport) {
    notify(reporter, report.job_id, report.status.into(), &report.message).await;
}
