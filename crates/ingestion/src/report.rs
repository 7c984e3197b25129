//! Outcome of one pipeline run.
//!
//! Every run ends in a [`RunReport`], whatever happened: the pipelines turn
//! terminal errors into an `ERROR` (or `SKIPPED`) report at their boundary
//! instead of propagating them to the host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use forecast_common::ForecastError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Ok,
    /// Some variables succeeded, some failed
    Partial,
    /// Nothing to do, e.g. the selection was empty
    Skipped,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Ok => "OK",
            RunStatus::Partial => "PARTIAL",
            RunStatus::Skipped => "SKIPPED",
            RunStatus::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

impl RunStatus {
    /// Status for a run that ended in `error`.
    pub fn for_error(error: &ForecastError) -> Self {
        if error.is_empty_selection() {
            RunStatus::Skipped
        } else {
            RunStatus::Error
        }
    }
}

/// Result for a single requested variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableOutcome {
    pub variable: String,
    pub status: RunStatus,
    /// Artifact or dataset URI/path on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// First timestamp covered by the artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VariableOutcome {
    pub fn success(variable: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            status: RunStatus::Ok,
            reference: Some(reference.into()),
            date: None,
            error_code: None,
            message: None,
        }
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn failure(variable: impl Into<String>, error: &ForecastError) -> Self {
        Self {
            variable: variable.into(),
            status: RunStatus::for_error(error),
            reference: None,
            date: None,
            error_code: Some(error.code().to_string()),
            message: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Ok
    }
}

/// Report returned to the host for every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub job_id: Uuid,
    pub status: RunStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default)]
    pub outcomes: Vec<VariableOutcome>,
}

impl RunReport {
    /// Aggregate per-variable outcomes.
    ///
    /// `OK` when every variable succeeded, `PARTIAL` when some did, and when
    /// none did the run takes the status of its failures (`SKIPPED` only if
    /// every failure was an empty selection).
    pub fn from_outcomes(
        job_id: Uuid,
        forecast_run: Option<DateTime<Utc>>,
        outcomes: Vec<VariableOutcome>,
    ) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        let total = outcomes.len();

        let status = if total == 0 {
            RunStatus::Skipped
        } else if succeeded == total {
            RunStatus::Ok
        } else if succeeded > 0 {
            RunStatus::Partial
        } else if outcomes.iter().all(|o| o.status == RunStatus::Skipped) {
            RunStatus::Skipped
        } else {
            RunStatus::Error
        };

        let message = match status {
            RunStatus::Ok => format!("{} variable(s) processed", total),
            RunStatus::Skipped if total == 0 => "no variables to process".to_string(),
            _ => {
                let failed: Vec<String> = outcomes
                    .iter()
                    .filter(|o| !o.is_success())
                    .map(|o| {
                        format!(
                            "{}: {}",
                            o.variable,
                            o.message.as_deref().unwrap_or("failed")
                        )
                    })
                    .collect();
                format!("{}/{} variable(s) processed; {}", succeeded, total, failed.join("; "))
            }
        };

        // A single shared failure code is useful to hosts; mixed ones are not
        let error_code = if status == RunStatus::Ok {
            None
        } else {
            let mut codes = outcomes.iter().filter_map(|o| o.error_code.as_deref());
            let first = codes.next();
            match first {
                Some(code) if codes.all(|c| c == code) => Some(code.to_string()),
                _ => None,
            }
        };

        Self {
            job_id,
            status,
            message,
            forecast_run,
            error_code,
            outcomes,
        }
    }

    /// Report for a run that failed as a whole.
    pub fn from_error(job_id: Uuid, error: &ForecastError) -> Self {
        Self {
            job_id,
            status: RunStatus::for_error(error),
            message: error.to_string(),
            forecast_run: None,
            error_code: Some(error.code().to_string()),
            outcomes: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Ok | RunStatus::Partial)
    }

    /// References of every produced artifact, in request order.
    pub fn references(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| o.reference.as_deref())
            .collect()
    }
}
