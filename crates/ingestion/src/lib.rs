//! Ingestion and retrieval pipelines for Meteoblue point forecasts.
//!
//! Ingestion fetches one forecast body per grid point of a bounding box,
//! normalizes them into a canonical gridded dataset and stores it under its
//! (service, location, run) key. Retrieval validates a subset request,
//! picks the run that serves it, slices the stored dataset and writes one
//! GeoTIFF per variable.
//!
//! Both pipelines are exposed to hosts through [`ProcessAdapter`] and always
//! answer with a [`RunReport`].

pub mod adapter;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod ingester;
pub mod points;
pub mod report;
pub mod retriever;
pub mod runs;
pub mod status;
pub mod validation;
pub mod workspace;

pub use adapter::ProcessAdapter;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{load_service_table, service_table_from_yaml, PipelineConfig};
pub use context::PipelineContext;
pub use error::{IngestionError, Result};
pub use fetch::ForecastFetcher;
pub use ingester::{IngestOutcome, IngestionPipeline};
pub use points::GridPoints;
pub use report::{RunReport, RunStatus, VariableOutcome};
pub use retriever::RetrievalPipeline;
pub use runs::{ForecastRunResolver, RunState};
pub use status::{JobState, StatusReporter, TracingStatusReporter};
pub use validation::{normalize_location, RangeValidator, RawParams};
pub use workspace::RunWorkspace;
