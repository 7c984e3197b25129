//! Upstream forecast source.

use async_trait::async_trait;
use serde_json::Value;

use forecast_common::{ForecastResult, ServiceDefinition};

/// Fetches the raw forecast body of one grid point.
///
/// Implementations own their retry policy and fail with
/// `ForecastError::UpstreamFetch` once it is exhausted.
#[async_trait]
pub trait ForecastFetcher: Send + Sync {
    async fn fetch(&self, service: &ServiceDefinition, lat: f64, lon: f64) -> ForecastResult<Value>;
}
