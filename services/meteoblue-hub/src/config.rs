//! Hub configuration.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

use storage::ObjectStorageConfig;

/// Where canonical datasets are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Local(PathBuf),
    Memory,
}

/// Retry schedule for upstream requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry)
    pub initial_retry_delay: Duration,
    /// Maximum retry delay
    pub max_retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(120),
        }
    }
}

/// Top-level hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Dataset storage backend
    pub backend: StorageBackend,

    /// S3 connection, also used to publish artifacts to destination buckets
    pub storage: ObjectStorageConfig,

    /// Meteoblue API key, required whenever data is fetched
    pub api_key: Option<String>,

    /// Status endpoint receiving job state changes
    pub status_url: Option<String>,

    /// Upstream request timeout
    pub http_timeout: Duration,

    pub retry: RetryConfig,
}

impl HubConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let storage = ObjectStorageConfig {
            endpoint: var("S3_ENDPOINT").unwrap_or_else(|| "http://minio:9000".to_string()),
            bucket: var("S3_BUCKET").unwrap_or_else(|| "meteoblue-hub".to_string()),
            access_key_id: var("S3_ACCESS_KEY").unwrap_or_else(|| "minioadmin".to_string()),
            secret_access_key: var("S3_SECRET_KEY").unwrap_or_else(|| "minioadmin".to_string()),
            region: var("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            allow_http: var("S3_ALLOW_HTTP").map(|v| v == "true").unwrap_or(true),
        };

        let backend = match var("STORAGE_BACKEND").as_deref().unwrap_or("s3") {
            "s3" => StorageBackend::S3,
            "local" => StorageBackend::Local(
                var("LOCAL_STORE_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./data")),
            ),
            "memory" => StorageBackend::Memory,
            other => bail!("unknown STORAGE_BACKEND '{}' (expected s3, local or memory)", other),
        };

        let defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_retries: parse_or(&var, "FETCH_MAX_RETRIES", defaults.max_retries)?,
            initial_retry_delay: Duration::from_millis(parse_or(
                &var,
                "FETCH_RETRY_DELAY_MS",
                defaults.initial_retry_delay.as_millis() as u64,
            )?),
            max_retry_delay: Duration::from_secs(parse_or(
                &var,
                "FETCH_MAX_RETRY_DELAY_SECS",
                defaults.max_retry_delay.as_secs(),
            )?),
        };

        Ok(Self {
            backend,
            storage,
            api_key: var("METEOBLUE_API_KEY").filter(|k| !k.is_empty()),
            status_url: var("STATUS_URL").filter(|u| !u.is_empty()),
            http_timeout: Duration::from_secs(parse_or(&var, "HTTP_TIMEOUT_SECS", 60)?),
            retry,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend == StorageBackend::S3 && self.storage.bucket.is_empty() {
            bail!("S3_BUCKET must not be empty");
        }
        if self.http_timeout.is_zero() {
            bail!("HTTP_TIMEOUT_SECS must be positive");
        }
        if self.retry.initial_retry_delay > self.retry.max_retry_delay {
            bail!("FETCH_RETRY_DELAY_MS exceeds FETCH_MAX_RETRY_DELAY_SECS");
        }
        Ok(())
    }
}

fn parse_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match var(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => Ok(value),
            Err(_) => bail!("{} is not a valid number: '{}'", key, raw),
        },
        None => Ok(default),
    }
}
