//! Common types and utilities shared across the forecast hub crates.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod grid;
pub mod request;
pub mod service;
pub mod time;
pub mod variable;

pub use bbox::BoundingBox;
pub use crs::CrsCode;
pub use error::{ForecastError, ForecastResult, ValidationError, ValidationKind};
pub use grid::{Grid, GriddedDataset, VariableSeries};
pub use request::{BucketUri, CoordRange, IngestRequest, OutputTarget, RasterFormat, SubsetRequest};
pub use service::{ServiceDefinition, ServiceTable, DEFAULT_SERVICE};
pub use time::{
    band_label, floor_to_interval, is_aligned, parse_timestamp, TimeParseError, TimeWindow,
};
pub use variable::{
    VariableCatalog, VariableClass, VariableDefinition, VariableKind, DEFAULT_VARIABLE,
};
