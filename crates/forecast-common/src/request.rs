//! Validated request value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{ForecastError, ForecastResult};
use crate::{BoundingBox, TimeWindow};

/// Closed coordinate range with `min < max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordRange {
    pub min: f64,
    pub max: f64,
}

impl CoordRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn as_tuple(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

/// Raster output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    #[default]
    #[serde(rename = "tif")]
    GeoTiff,
}

impl RasterFormat {
    pub fn parse(s: &str) -> ForecastResult<Self> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "tif" | "tiff" | "geotiff" => Ok(RasterFormat::GeoTiff),
            other => Err(ForecastError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::GeoTiff => "tif",
        }
    }
}

/// An `s3://bucket/prefix` destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketUri {
    pub bucket: String,
    pub prefix: String,
}

impl BucketUri {
    pub fn parse(s: &str) -> Result<Self, String> {
        let rest = s
            .trim()
            .strip_prefix("s3://")
            .ok_or_else(|| format!("bucket URI must start with s3://, got '{}'", s))?;
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(format!("bucket URI has no bucket name: '{}'", s));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        })
    }

    /// Object key for a file name under this prefix.
    pub fn key_for(&self, file_name: &str) -> String {
        if self.prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", self.prefix, file_name)
        }
    }
}

impl fmt::Display for BucketUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "s3://{}", self.bucket)
        } else {
            write!(f, "s3://{}/{}", self.bucket, self.prefix)
        }
    }
}

/// Where retrieval artifacts go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTarget {
    /// Exact output file; gets a variable suffix when several variables are exported
    pub out: Option<PathBuf>,
    /// Directory for generated file names
    pub out_dir: Option<PathBuf>,
    /// Object storage destination for published artifacts
    pub bucket: Option<BucketUri>,
}

/// Validated retrieval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetRequest {
    pub variables: Vec<String>,
    pub service: String,
    pub location: String,
    pub lat_range: Option<CoordRange>,
    pub lon_range: Option<CoordRange>,
    pub window: TimeWindow,
    pub resolution_m: u32,
    pub time_delta_minutes: u32,
    pub format: RasterFormat,
    #[serde(default)]
    pub output: OutputTarget,
}

impl SubsetRequest {
    /// Bounding box when both ranges are given.
    pub fn bbox(&self) -> Option<BoundingBox> {
        match (self.lat_range, self.lon_range) {
            (Some(lat), Some(lon)) => Some(BoundingBox::from_ranges(lat.as_tuple(), lon.as_tuple())),
            _ => None,
        }
    }

    /// The ingestion needed to serve this request, when it carries a bbox.
    pub fn to_ingest_request(&self) -> Option<IngestRequest> {
        Some(IngestRequest {
            variables: self.variables.clone(),
            service: self.service.clone(),
            location: self.location.clone(),
            bbox: self.bbox()?,
            resolution_m: self.resolution_m,
            time_delta_minutes: self.time_delta_minutes,
        })
    }
}

/// Validated ingestion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub variables: Vec<String>,
    pub service: String,
    pub location: String,
    pub bbox: BoundingBox,
    pub resolution_m: u32,
    pub time_delta_minutes: u32,
}
