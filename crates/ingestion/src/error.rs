//! Error types for the ingestion crate.
//!
//! Pipeline failures use [`ForecastError`]; this enum covers loading the
//! pipeline configuration.

use std::path::PathBuf;
use thiserror::Error;

use forecast_common::ForecastError;

/// Errors raised while setting up the pipelines.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse services file: {0}")]
    ServicesParse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Forecast(#[from] ForecastError),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
