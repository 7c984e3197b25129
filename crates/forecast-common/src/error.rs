//! Error types for the forecast hub.

use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Result type alias using ForecastError.
pub type ForecastResult<T> = Result<T, ForecastError>;

/// Category of a rejected request parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationKind {
    /// Range minimum is not strictly below its maximum.
    InvalidOrder,
    /// Coordinate outside the geographic bounds.
    OutOfRange,
    /// Grid resolution below 100 or not a multiple of 100.
    UnsupportedResolution,
    /// Time step not a positive multiple of the service resolution.
    InvalidTimeDelta,
    /// Unparsable number, date or list.
    InvalidFormat,
    /// Output format string names no supported raster format.
    UnsupportedFormat,
    UnknownVariable,
    UnknownService,
    MissingParameter,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationKind::InvalidOrder => "InvalidOrder",
            ValidationKind::OutOfRange => "OutOfRange",
            ValidationKind::UnsupportedResolution => "UnsupportedResolution",
            ValidationKind::InvalidTimeDelta => "InvalidTimeDelta",
            ValidationKind::InvalidFormat => "InvalidFormat",
            ValidationKind::UnsupportedFormat => "UnsupportedFormat",
            ValidationKind::UnknownVariable => "UnknownVariable",
            ValidationKind::UnknownService => "UnknownService",
            ValidationKind::MissingParameter => "MissingParameter",
        };
        write!(f, "{}", name)
    }
}

/// A request parameter was rejected before any I/O took place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ValidationError {
    pub kind: ValidationKind,
    pub message: String,
}

impl ValidationError {
    pub fn new(kind: ValidationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_order(message: impl Into<String>) -> Self {
        Self::new(ValidationKind::InvalidOrder, message)
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(ValidationKind::OutOfRange, message)
    }

    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(ValidationKind::InvalidFormat, message)
    }

    pub fn missing(param: &str) -> Self {
        Self::new(
            ValidationKind::MissingParameter,
            format!("missing required parameter: {}", param),
        )
    }
}

/// Primary error type for forecast hub operations.
#[derive(Debug, Clone, Error)]
pub enum ForecastError {
    // === Request Errors ===
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("No available forecast run for service '{service}' at {requested}: {reason}")]
    NoAvailableRun {
        service: String,
        requested: DateTime<Utc>,
        reason: String,
    },

    #[error("Selection is empty: {0}")]
    EmptySelection(String),

    // === Data Errors ===
    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(String),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Derived variable '{variable}' is missing dependency '{dependency}'")]
    MissingDependency { variable: String, dependency: String },

    #[error("Grid shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Variable '{0}' is not present in the stored dataset")]
    VariableNotIngested(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    // === Output Errors ===
    #[error("Requested format not supported: {0}")]
    UnsupportedFormat(String),

    // === Infrastructure Errors ===
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ForecastError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPayload(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn empty_selection(msg: impl Into<String>) -> Self {
        Self::EmptySelection(msg.into())
    }

    pub fn no_available_run(
        service: impl Into<String>,
        requested: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self::NoAvailableRun {
            service: service.into(),
            requested,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code used in run reports.
    pub fn code(&self) -> &'static str {
        match self {
            ForecastError::Validation(e) => match e.kind {
                ValidationKind::InvalidOrder => "InvalidOrder",
                ValidationKind::OutOfRange => "OutOfRange",
                ValidationKind::UnsupportedResolution => "UnsupportedResolution",
                ValidationKind::InvalidTimeDelta => "InvalidTimeDelta",
                ValidationKind::InvalidFormat => "InvalidFormat",
                ValidationKind::UnsupportedFormat => "UnsupportedFormat",
                ValidationKind::UnknownVariable => "UnknownVariable",
                ValidationKind::UnknownService => "UnknownService",
                ValidationKind::MissingParameter => "MissingParameter",
            },
            ForecastError::NoAvailableRun { .. } => "NoAvailableRun",
            ForecastError::EmptySelection(_) => "EmptySelection",
            ForecastError::UpstreamFetch(_) => "UpstreamFetchError",
            ForecastError::UnknownVariable(_) => "UnknownVariable",
            ForecastError::MissingDependency { .. } => "MissingDependency",
            ForecastError::ShapeMismatch(_) => "ShapeMismatch",
            ForecastError::MalformedPayload(_) => "MalformedPayload",
            ForecastError::VariableNotIngested(_) => "VariableNotIngested",
            ForecastError::DatasetNotFound(_) => "DatasetNotFound",
            ForecastError::UnsupportedFormat(_) => "UnsupportedFormat",
            ForecastError::Storage(_) => "StorageError",
            ForecastError::Io(_) => "IoError",
            ForecastError::Serialization(_) => "SerializationError",
        }
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ForecastError::UpstreamFetch(_) | ForecastError::Storage(_) | ForecastError::Io(_)
        )
    }

    /// Empty selections are an expected outcome, not a failure.
    pub fn is_empty_selection(&self) -> bool {
        matches!(self, ForecastError::EmptySelection(_))
    }
}

// Conversion from common error types
impl From<std::io::Error> for ForecastError {
    fn from(err: std::io::Error) -> Self {
        ForecastError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::Serialization(format!("JSON error: {}", err))
    }
}
