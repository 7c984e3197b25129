//! Meteoblue package API client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Request, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use forecast_common::{ForecastError, ForecastResult, ServiceDefinition};
use ingestion::ForecastFetcher;

use crate::config::RetryConfig;

/// Longest slice of an error body kept in messages.
const MAX_ERROR_BODY: usize = 200;

/// Why a single request attempt failed.
#[derive(Debug, Error)]
enum AttemptError {
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("response is not JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Status { status, .. } => retryable_status(*status),
            AttemptError::Request(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            AttemptError::Decode(_) => false,
        }
    }

    fn into_forecast_error(self, attempts: u32) -> ForecastError {
        match self {
            AttemptError::Decode(e) => ForecastError::malformed(e.to_string()),
            other => ForecastError::UpstreamFetch(format!("{} after {} attempt(s)", other, attempts)),
        }
    }
}

/// Server errors and throttling are worth another attempt, other client
/// errors are not.
fn retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Exponential backoff step.
fn next_delay(delay: Duration, max: Duration) -> Duration {
    std::cmp::min(delay * 2, max)
}

/// Fetches point forecasts from the Meteoblue package endpoints.
pub struct MeteoblueClient {
    client: Client,
    api_key: String,
    retry: RetryConfig,
}

impl MeteoblueClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration, retry: RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(16)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            retry,
        })
    }

    fn request(&self, service: &ServiceDefinition, lat: f64, lon: f64) -> reqwest::Result<Request> {
        self.client
            .get(&service.endpoint)
            .query(&[
                ("format", "json".to_string()),
                ("apikey", self.api_key.clone()),
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
            ])
            .build()
    }

    async fn attempt(&self, service: &ServiceDefinition, lat: f64, lon: f64) -> Result<Value, AttemptError> {
        let request = self.request(service, lat, lon)?;
        let response = self.client.execute(request).await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            let cut = body.char_indices().nth(MAX_ERROR_BODY).map_or(body.len(), |(i, _)| i);
            body.truncate(cut);
            return Err(AttemptError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ForecastFetcher for MeteoblueClient {
    #[instrument(skip(self, service), fields(service = %service.id))]
    async fn fetch(&self, service: &ServiceDefinition, lat: f64, lon: f64) -> ForecastResult<Value> {
        let mut retry_count = 0;
        let mut delay = self.retry.initial_retry_delay;

        loop {
            match self.attempt(service, lat, lon).await {
                Ok(body) => {
                    debug!(retries = retry_count, "Point forecast fetched");
                    return Ok(body);
                }
                Err(e) => {
                    retry_count += 1;
                    if !e.is_retryable() || retry_count > self.retry.max_retries {
                        return Err(e.into_forecast_error(retry_count));
                    }

                    warn!(
                        error = %e,
                        retry = retry_count,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Point fetch failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, self.retry.max_retry_delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MeteoblueClient {
        MeteoblueClient::new("k3y", Duration::from_secs(5), RetryConfig::default()).unwrap()
    }

    #[test]
    fn test_request_query() {
        let request = client()
            .request(&ServiceDefinition::basic_1h(), 45.5, 9.25)
            .unwrap();
        assert_eq!(request.url().path(), "/packages/basic-1h");
        assert_eq!(
            request.url().query(),
            Some("format=json&apikey=k3y&lat=45.5&lon=9.25")
        );
    }

    #[test]
    fn test_retryable_status() {
        assert!(retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(retryable_status(StatusCode::BAD_GATEWAY));
        assert!(retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!retryable_status(StatusCode::BAD_REQUEST));
        assert!(!retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!retryable_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_backoff_is_capped() {
        let max = Duration::from_secs(120);
        let mut delay = Duration::from_secs(2);
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(delay.as_secs());
            delay = next_delay(delay, max);
        }
        assert_eq!(seen, vec![2, 4, 8, 16, 32, 64, 120]);
    }

    #[test]
    fn test_attempt_error_mapping() {
        let fatal = AttemptError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: "invalid apikey".into(),
        };
        assert!(!fatal.is_retryable());
        assert_eq!(fatal.into_forecast_error(1).code(), "UpstreamFetchError");

        let decode = serde_json::from_str::<Value>("<html>").unwrap_err();
        let e = AttemptError::from(decode);
        assert!(!e.is_retryable());
        assert_eq!(e.into_forecast_error(1).code(), "MalformedPayload");
    }
}
