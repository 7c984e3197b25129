//! Forecast grid processing.
//!
//! Turns raw per-point provider responses into canonical gridded datasets
//! and cuts them back down for retrieval.
//!
//! # Architecture
//!
//! ```text
//! RawResponse (one JSON body per grid point)
//!      │
//!      ▼
//! GridNormalizer::ingest_raw_response
//!      │
//!      ├─► shared UTC time axis
//!      ├─► unit conversion to catalog units
//!      ├─► cumulative -> per-step increments
//!      ├─► resample to the requested time step
//!      └─► derived variables (wind components, dewpoint)
//!               │
//!               ▼
//!         GriddedDataset  ──► stored
//!               │
//!               ▼
//! SpatioTemporalSubsetter::subset(bbox, window)
//! ```

pub mod normalize;
pub mod resample;
pub mod subset;
pub mod units;

pub use normalize::{GridNormalizer, NormalizeOptions, NormalizedDataset, PointPayload, RawResponse};
pub use resample::{cumulative_to_incremental, resample_frames, resample_series, ResampleMethod};
pub use subset::SpatioTemporalSubsetter;
pub use units::{conversion_to, unit_group, UnitConversion};
