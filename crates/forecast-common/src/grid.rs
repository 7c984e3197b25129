//! Canonical gridded dataset types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ForecastError, ForecastResult};
use crate::variable::VariableClass;
use crate::{BoundingBox, CrsCode};

/// A 2-D field of `ny` rows (south to north) by `nx` columns (west to east).
///
/// NaN marks cells with no data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub nx: usize,
    pub ny: usize,
    #[serde(with = "nan_as_null")]
    pub values: Vec<f32>,
}

impl Grid {
    /// Create a grid, checking that `values` holds exactly `nx * ny` cells.
    pub fn new(nx: usize, ny: usize, values: Vec<f32>) -> ForecastResult<Self> {
        if values.len() != nx * ny {
            return Err(ForecastError::ShapeMismatch(format!(
                "expected {}x{} = {} cells, got {}",
                nx,
                ny,
                nx * ny,
                values.len()
            )));
        }
        Ok(Self { nx, ny, values })
    }

    /// A grid with every cell set to `value`.
    pub fn filled(nx: usize, ny: usize, value: f32) -> Self {
        Self {
            nx,
            ny,
            values: vec![value; nx * ny],
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    /// Value at `(row, col)`, row 0 being the southernmost latitude.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.ny || col >= self.nx {
            return None;
        }
        self.values.get(row * self.nx + col).copied()
    }

    /// Copy out the rows and columns selected by the given index lists.
    pub fn select(&self, rows: &[usize], cols: &[usize]) -> Grid {
        let mut values = Vec::with_capacity(rows.len() * cols.len());
        for &row in rows {
            for &col in cols {
                values.push(self.get(row, col).unwrap_or(f32::NAN));
            }
        }
        Grid {
            nx: cols.len(),
            ny: rows.len(),
            values,
        }
    }

    /// Number of non-NaN cells.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }
}

/// One variable of a dataset: its own time axis and one grid per timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSeries {
    pub unit: String,
    pub class: VariableClass,
    pub times: Vec<DateTime<Utc>>,
    pub frames: Vec<Grid>,
}

impl VariableSeries {
    pub fn new(
        unit: impl Into<String>,
        class: VariableClass,
        times: Vec<DateTime<Utc>>,
        frames: Vec<Grid>,
    ) -> ForecastResult<Self> {
        if times.len() != frames.len() {
            return Err(ForecastError::ShapeMismatch(format!(
                "{} timestamps but {} frames",
                times.len(),
                frames.len()
            )));
        }
        Ok(Self {
            unit: unit.into(),
            class,
            times,
            frames,
        })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Frame valid at exactly `time`.
    pub fn frame_at(&self, time: &DateTime<Utc>) -> Option<&Grid> {
        self.times
            .binary_search(time)
            .ok()
            .and_then(|idx| self.frames.get(idx))
    }
}

/// Canonical, provider-agnostic gridded time series.
///
/// Created once per (location, service, forecast run) and never mutated
/// after it has been persisted. Ordered maps keep serialization stable so
/// identical inputs produce identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GriddedDataset {
    pub location: String,
    pub service: String,
    pub forecast_run: DateTime<Utc>,
    pub crs: CrsCode,
    /// Nominal grid spacing in metres
    pub resolution_m: u32,
    /// Spacing of the time axis in minutes
    pub time_delta_minutes: u32,
    /// Ascending latitudes (grid rows)
    pub lats: Vec<f64>,
    /// Ascending longitudes (grid columns)
    pub lons: Vec<f64>,
    pub variables: BTreeMap<String, VariableSeries>,
}

impl GriddedDataset {
    /// Bounding box through the outermost grid points.
    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::from_axes(&self.lats, &self.lons)
    }

    pub fn nx(&self) -> usize {
        self.lons.len()
    }

    pub fn ny(&self) -> usize {
        self.lats.len()
    }

    pub fn variable(&self, code: &str) -> Option<&VariableSeries> {
        self.variables.get(code)
    }

    pub fn variable_codes(&self) -> Vec<&str> {
        self.variables.keys().map(String::as_str).collect()
    }

    /// Same metadata and axes, without any variables.
    pub fn empty_like(&self) -> GriddedDataset {
        GriddedDataset {
            location: self.location.clone(),
            service: self.service.clone(),
            forecast_run: self.forecast_run,
            crs: self.crs,
            resolution_m: self.resolution_m,
            time_delta_minutes: self.time_delta_minutes,
            lats: self.lats.clone(),
            lons: self.lons.clone(),
            variables: BTreeMap::new(),
        }
    }
}

/// Serialize NaN cells as JSON `null` and read them back as NaN.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(values: &[f32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(values.iter().map(|v| if v.is_nan() { None } else { Some(*v) }))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<f32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Vec<Option<f32>> = Vec::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|v| v.unwrap_or(f32::NAN)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_dataset() -> GriddedDataset {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 27, 1, 0, 0).unwrap();
        let grid = Grid::new(2, 2, vec![0.5, f32::NAN, 1.0, 2.0]).unwrap();
        let series =
            VariableSeries::new("mm", VariableClass::Accumulated, vec![t0], vec![grid]).unwrap();

        let mut variables = BTreeMap::new();
        variables.insert("precipitation".to_string(), series);

        GriddedDataset {
            location: "Lake_Como".to_string(),
            service: "basic-1h".to_string(),
            forecast_run: Utc.with_ymd_and_hms(2026, 1, 27, 0, 0, 0).unwrap(),
            crs: CrsCode::Epsg4326,
            resolution_m: 1000,
            time_delta_minutes: 60,
            lats: vec![45.0, 46.0],
            lons: vec![9.0, 10.0],
            variables,
        }
    }

    #[test]
    fn test_grid_shape_check() {
        assert!(Grid::new(3, 2, vec![0.0; 6]).is_ok());
        assert!(matches!(
            Grid::new(3, 2, vec![0.0; 5]),
            Err(ForecastError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_grid_select() {
        let grid = Grid::new(3, 2, vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]).unwrap();
        let sub = grid.select(&[1], &[0, 2]);
        assert_eq!(sub.shape(), (2, 1));
        assert_eq!(sub.values, vec![10.0, 12.0]);
    }

    #[test]
    fn test_nan_serializes_as_null() {
        let dataset = sample_dataset();
        let json = serde_json::to_string(&dataset).unwrap();
        assert!(json.contains("[0.5,null,1.0,2.0]"));

        let back: GriddedDataset = serde_json::from_str(&json).unwrap();
        let values = &back.variables["precipitation"].frames[0].values;
        assert!(values[1].is_nan());
        assert_eq!(values[3], 2.0);
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let a = serde_json::to_vec(&sample_dataset()).unwrap();
        let b = serde_json::to_vec(&sample_dataset()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_bbox_from_axes() {
        let bbox = sample_dataset().bbox().unwrap();
        assert_eq!(bbox, BoundingBox::new(9.0, 45.0, 10.0, 46.0));
    }
}
