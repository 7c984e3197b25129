//! Forecast run availability.
//!
//! A run is a model initialisation timestamp on the service's init
//! frequency. Its state is a pure function of the run time and "now":
//!
//! ```text
//!   now < run                      Unknown
//!   now < run + latency            Pending
//!   now - run <= retention         Available
//!   otherwise                      Expired
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use forecast_common::{
    floor_to_interval, ForecastError, ForecastResult, ServiceDefinition, TimeWindow,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Nominal time not reached yet
    Unknown,
    /// Initialised but not yet published
    Pending,
    Available,
    /// Older than the retention period
    Expired,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Unknown => "unknown",
            RunState::Pending => "pending",
            RunState::Available => "available",
            RunState::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// Run selection for one service.
#[derive(Debug, Clone, Copy)]
pub struct ForecastRunResolver<'a> {
    service: &'a ServiceDefinition,
}

impl<'a> ForecastRunResolver<'a> {
    pub fn new(service: &'a ServiceDefinition) -> Self {
        Self { service }
    }

    /// State of `run` as seen at `now`.
    pub fn state(&self, run: DateTime<Utc>, now: DateTime<Utc>) -> RunState {
        if now < run {
            RunState::Unknown
        } else if now < run + self.service.publication_latency() {
            RunState::Pending
        } else if now - run <= self.service.retention() {
            RunState::Available
        } else {
            RunState::Expired
        }
    }

    /// Runs available at `reference_time`, ascending.
    pub fn compute_available_runs(&self, reference_time: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let mut runs = Vec::new();
        let mut run = floor_to_interval(reference_time, self.service.init_frequency_minutes);
        loop {
            match self.state(run, reference_time) {
                RunState::Available => runs.push(run),
                RunState::Expired => break,
                RunState::Unknown | RunState::Pending => {}
            }
            run -= self.service.init_frequency();
        }
        runs.reverse();
        runs
    }

    /// Latest run at or before `requested_time` that is available at `now`.
    ///
    /// Fails with `NoAvailableRun` when the requested time lies outside
    /// `[now - retention, now + horizon]` or no run at or before it is
    /// available any more.
    pub fn select_run_for_request(
        &self,
        requested_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ForecastResult<DateTime<Utc>> {
        let service = &self.service.id;
        let earliest = now - self.service.retention();
        let latest = now + self.service.forward_horizon();

        if requested_time < earliest {
            return Err(ForecastError::no_available_run(
                service,
                requested_time,
                format!("before the retention horizon {}", earliest),
            ));
        }
        if requested_time > latest {
            return Err(ForecastError::no_available_run(
                service,
                requested_time,
                format!("beyond the forecast horizon {}", latest),
            ));
        }

        let mut run = floor_to_interval(requested_time, self.service.init_frequency_minutes);
        loop {
            match self.state(run, now) {
                RunState::Available => {
                    debug!(service = %service, run = %run, requested = %requested_time, "Selected forecast run");
                    return Ok(run);
                }
                RunState::Expired => {
                    return Err(ForecastError::no_available_run(
                        service,
                        requested_time,
                        format!("run {} has expired", run),
                    ));
                }
                RunState::Unknown | RunState::Pending => {
                    run -= self.service.init_frequency();
                }
            }
        }
    }

    /// Clip `window` to the availability window at `now`.
    ///
    /// Fails with `NoAvailableRun` when they don't overlap at all.
    pub fn check_window(&self, window: &TimeWindow, now: DateTime<Utc>) -> ForecastResult<TimeWindow> {
        let earliest = now - self.service.retention();
        let latest = now + self.service.forward_horizon();

        let clipped = window.clip(earliest, latest).ok_or_else(|| {
            ForecastError::no_available_run(
                &self.service.id,
                window.start,
                format!(
                    "window {}..{} is outside the available range {}..{}",
                    window.start, window.end, earliest, latest
                ),
            )
        })?;

        if clipped != *window {
            debug!(
                service = %self.service.id,
                start = %clipped.start,
                end = %clipped.end,
                "Clipped time window to availability"
            );
        }
        Ok(clipped)
    }
}
