//! Export of subsetted datasets as georeferenced raster files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use forecast_common::{
    band_label, CrsCode, ForecastError, ForecastResult, GriddedDataset, RasterFormat,
};

use crate::geotiff::{GeoTiffWriter, GeoTransform, RasterBand, TiffCompression, NODATA_VALUE};

/// Prefix of generated artifact names.
pub const ARTIFACT_PREFIX: &str = "Meteoblue";

/// Degrees per metre of nominal grid resolution.
const DEGREES_PER_METRE: f64 = 1e-5;

/// One band of an exported raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandInfo {
    /// 1-based band index
    pub index: usize,
    pub timestamp: DateTime<Utc>,
}

/// A raster written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterArtifact {
    pub path: PathBuf,
    /// Object storage URI once published
    pub uri: Option<String>,
    pub variable: String,
    pub crs: CrsCode,
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
    pub bands: Vec<BandInfo>,
    pub nodata: f32,
}

impl RasterArtifact {
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Where the artifact can be fetched from: the URI when published,
    /// otherwise the local path.
    pub fn reference(&self) -> String {
        self.uri
            .clone()
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Writes one multi-band raster per variable.
#[derive(Debug, Clone, Default)]
pub struct RasterExporter {
    compression: TiffCompression,
}

impl RasterExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, compression: TiffCompression) -> Self {
        self.compression = compression;
        self
    }

    /// `Meteoblue__{location}__{variable}__{first_timestamp}.tif`
    pub fn default_file_name(
        location: &str,
        variable: &str,
        first_timestamp: &DateTime<Utc>,
        format: RasterFormat,
    ) -> String {
        format!(
            "{}__{}__{}__{}.{}",
            ARTIFACT_PREFIX,
            location,
            variable,
            band_label(first_timestamp),
            format.extension()
        )
    }

    /// Encode one variable of a subset into GeoTIFF bytes.
    ///
    /// Rows are written north-up, one band per timestamp in chronological
    /// order, NaN cells as the nodata value.
    pub fn encode(
        &self,
        subset: &GriddedDataset,
        variable: &str,
    ) -> ForecastResult<(Vec<u8>, RasterLayout)> {
        let series = subset
            .variable(variable)
            .ok_or_else(|| ForecastError::VariableNotIngested(variable.to_string()))?;
        if series.is_empty() {
            return Err(ForecastError::empty_selection(format!(
                "no timestamps for '{}'",
                variable
            )));
        }

        let (nx, ny) = (subset.nx(), subset.ny());
        let fallback_step = f64::from(subset.resolution_m) * DEGREES_PER_METRE;
        let transform = GeoTransform::from_axes(&subset.lats, &subset.lons, fallback_step)
            .ok_or_else(|| ForecastError::empty_selection("subset has no grid points"))?;

        let bands = series
            .times
            .iter()
            .zip(&series.frames)
            .map(|(time, frame)| {
                if frame.shape() != (nx, ny) {
                    return Err(ForecastError::ShapeMismatch(format!(
                        "frame at {} is {:?}, axes are {}x{}",
                        time,
                        frame.shape(),
                        nx,
                        ny
                    )));
                }
                let mut values = Vec::with_capacity(nx * ny);
                for row in (0..ny).rev() {
                    values.extend_from_slice(&frame.values[row * nx..(row + 1) * nx]);
                }
                Ok(RasterBand {
                    description: band_label(time),
                    values,
                })
            })
            .collect::<ForecastResult<Vec<_>>>()?;

        let band_names: Vec<&str> = bands.iter().map(|b| b.description.as_str()).collect();
        let bytes = GeoTiffWriter::new(nx, ny, transform)
            .epsg(subset.crs.epsg())
            .nodata(NODATA_VALUE)
            .compression(self.compression)
            .metadata("band_names", band_names.join(","))
            .metadata("variable", variable)
            .metadata("units", series.unit.as_str())
            .metadata("location", subset.location.as_str())
            .metadata("service", subset.service.as_str())
            .metadata("forecast_run", subset.forecast_run.to_rfc3339())
            .encode(&bands)?;

        let layout = RasterLayout {
            transform,
            width: nx,
            height: ny,
            bands: series
                .times
                .iter()
                .enumerate()
                .map(|(i, t)| BandInfo {
                    index: i + 1,
                    timestamp: *t,
                })
                .collect(),
        };
        Ok((bytes, layout))
    }

    /// Write one variable to `destination`.
    ///
    /// Bytes go to a temporary file next to the destination which is then
    /// renamed into place, so the path never holds a partial raster.
    #[instrument(skip(self, subset), fields(location = %subset.location))]
    pub fn export(
        &self,
        subset: &GriddedDataset,
        variable: &str,
        format: RasterFormat,
        destination: &Path,
    ) -> ForecastResult<RasterArtifact> {
        let (bytes, layout) = self.encode(subset, variable)?;
        write_atomic(destination, &bytes)?;

        info!(
            variable,
            format = format.extension(),
            path = %destination.display(),
            bands = layout.bands.len(),
            width = layout.width,
            height = layout.height,
            "Wrote raster"
        );

        Ok(RasterArtifact {
            path: destination.to_path_buf(),
            uri: None,
            variable: variable.to_string(),
            crs: subset.crs,
            transform: layout.transform,
            width: layout.width,
            height: layout.height,
            bands: layout.bands,
            nodata: NODATA_VALUE,
        })
    }

    /// Write one variable into `dir` under its default name.
    pub fn export_to_dir(
        &self,
        subset: &GriddedDataset,
        variable: &str,
        format: RasterFormat,
        dir: &Path,
    ) -> ForecastResult<RasterArtifact> {
        let first = subset
            .variable(variable)
            .and_then(|s| s.times.first())
            .ok_or_else(|| {
                ForecastError::empty_selection(format!("no timestamps for '{}'", variable))
            })?;
        let name = Self::default_file_name(&subset.location, variable, first, format);
        self.export(subset, variable, format, &dir.join(name))
    }
}

/// Placement and band list of an encoded raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayout {
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
    pub bands: Vec<BandInfo>,
}

/// Write `bytes` to `destination` through a sibling temp file and rename.
pub fn write_atomic(destination: &Path, bytes: &[u8]) -> ForecastResult<()> {
    let dir = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(destination)
        .map_err(|e| ForecastError::Io(format!("persist {}: {}", destination.display(), e.error)))?;

    debug!(path = %destination.display(), size = bytes.len(), "Persisted file");
    Ok(())
}
