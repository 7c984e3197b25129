//! Pipeline configuration and the optional services file.
//!
//! The services file overrides or extends the built-in service table:
//!
//! ```yaml
//! services:
//!   - id: basic-1h
//!     endpoint: https://my.meteoblue.com/packages/basic-1h
//!     response_key: data_1h
//!     native_resolution_minutes: 60
//!     retention_hours: 72
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use forecast_common::{ServiceDefinition, ServiceTable};

use crate::error::{IngestionError, Result};

/// Default number of grid points fetched concurrently.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 10;

/// Default object prefix of stored datasets.
pub const DEFAULT_STORAGE_PREFIX: &str = "meteoblue";

/// Tuning shared by both pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Upstream requests in flight per run
    pub fetch_concurrency: usize,
    /// Prefix of canonical datasets inside the object store
    pub storage_prefix: String,
    /// Parent of run workspaces; system temp dir when unset
    pub workspace_root: Option<PathBuf>,
    /// Let retrieval ingest when no stored dataset covers the request
    pub fallback_ingestion: bool,
    /// Where rasters go when a request names no output location
    pub artifact_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
            workspace_root: None,
            fallback_ingestion: true,
            artifact_dir: PathBuf::from("."),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fetch_concurrency: std::env::var("FETCH_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fetch_concurrency),
            storage_prefix: std::env::var("STORAGE_PREFIX").unwrap_or(defaults.storage_prefix),
            workspace_root: std::env::var("WORKSPACE_ROOT").ok().map(PathBuf::from),
            fallback_ingestion: std::env::var("FALLBACK_INGESTION")
                .map(|s| !matches!(s.to_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(defaults.fallback_ingestion),
            artifact_dir: std::env::var("ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_dir),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch_concurrency == 0 {
            return Err(IngestionError::InvalidConfig(
                "fetch_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ServicesFile {
    #[serde(default)]
    services: Vec<ServiceDefinition>,
}

/// Parse a services document and apply it over the built-in table.
pub fn service_table_from_yaml(yaml: &str) -> Result<ServiceTable> {
    let file: ServicesFile = serde_yaml::from_str(yaml)?;
    for definition in &file.services {
        definition
            .validate()
            .map_err(IngestionError::InvalidConfig)?;
    }
    Ok(ServiceTable::builtin().with_overrides(file.services))
}

/// Load the service table, applying the services file when one is given.
pub fn load_service_table(path: Option<&Path>) -> Result<ServiceTable> {
    let Some(path) = path else {
        return Ok(ServiceTable::builtin());
    };
    let yaml = std::fs::read_to_string(path).map_err(|source| IngestionError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let table = service_table_from_yaml(&yaml)?;
    info!(path = %path.display(), services = ?table.ids(), "Loaded services file");
    Ok(table)
}
