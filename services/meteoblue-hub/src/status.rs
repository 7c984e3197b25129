//! HTTP status reporter.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use forecast_common::{ForecastError, ForecastResult};
use ingestion::{JobState, StatusReporter};

#[derive(Debug, Serialize)]
struct StatusUpdate<'a> {
    job_id: Uuid,
    state: JobState,
    message: &'a str,
}

/// Posts job state changes as JSON to a status endpoint.
pub struct HttpStatusReporter {
    client: Client,
    url: String,
}

impl HttpStatusReporter {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl StatusReporter for HttpStatusReporter {
    async fn report(&self, job_id: Uuid, state: JobState, message: &str) -> ForecastResult<()> {
        let update = StatusUpdate {
            job_id,
            state,
            message,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&update)
            .send()
            .await
            .map_err(|e| ForecastError::Io(format!("status update failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ForecastError::Io(format!(
                "status endpoint answered HTTP {}",
                response.status()
            )));
        }
        debug!(job_id = %job_id, state = %state, "Status update sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_body() {
        let job_id = Uuid::nil();
        let body = serde_json::to_value(StatusUpdate {
            job_id,
            state: JobState::Partial,
            message: "1/2 variable(s) processed",
        })
        .unwrap();
        assert_eq!(body["job_id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(body["state"], "partial");
        assert_eq!(body["message"], "1/2 variable(s) processed");
    }
}
