//! Conversion of raw per-point provider responses into a canonical dataset.
//!
//! The provider answers one request per grid point with a JSON body shaped
//! like
//!
//! ```text
//! {
//!   "metadata": { "utc_timeoffset": 1.0, ... },
//!   "units": { "temperature": "C", "precipitation": "mm", ... },
//!   "data_1h": { "time": ["2026-01-27 00:00", ...], "temperature": [...], ... }
//! }
//! ```
//!
//! where the data block key depends on the service.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

use forecast_common::{
    parse_timestamp, CrsCode, ForecastError, ForecastResult, Grid, GriddedDataset,
    ServiceDefinition, VariableCatalog, VariableClass, VariableKind, VariableSeries,
};

use crate::resample::{cumulative_to_incremental, resample_series};
use crate::units::{conversion_to, unit_group, UnitConversion};

/// Tolerance when matching a point's coordinates to the grid axes.
const COORD_TOLERANCE: f64 = 1e-6;

/// Raw response body for one grid point.
#[derive(Debug, Clone)]
pub struct PointPayload {
    pub lat: f64,
    pub lon: f64,
    pub body: Value,
}

/// Everything fetched for one ingestion run.
///
/// Points missing from `points` (failed fetches) become NaN cells.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Ascending latitudes of the requested grid
    pub lats: Vec<f64>,
    /// Ascending longitudes of the requested grid
    pub lons: Vec<f64>,
    pub points: Vec<PointPayload>,
}

/// Identity and shape of the dataset being produced.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub location: String,
    pub forecast_run: DateTime<Utc>,
    pub resolution_m: u32,
    pub time_delta_minutes: u32,
}

/// Normalizer output: the dataset of variables that succeeded, plus the
/// reason for every requested variable that did not.
#[derive(Debug, Clone)]
pub struct NormalizedDataset {
    pub dataset: GriddedDataset,
    pub failures: BTreeMap<String, ForecastError>,
}

/// Per-point view of the service data block.
struct PointBlock<'a> {
    row: usize,
    col: usize,
    data: &'a Map<String, Value>,
    units: Option<&'a Map<String, Value>>,
}

/// Turns raw provider payloads into a [`GriddedDataset`].
pub struct GridNormalizer<'a> {
    catalog: &'a VariableCatalog,
}

impl<'a> GridNormalizer<'a> {
    pub fn new(catalog: &'a VariableCatalog) -> Self {
        Self { catalog }
    }

    /// Normalize the raw response of one run.
    ///
    /// Fails as a whole with `MalformedPayload` when the service data block
    /// or its time axis is missing or inconsistent. Problems confined to one
    /// variable are reported in [`NormalizedDataset::failures`] instead.
    #[instrument(skip(self, raw, requested, options), fields(service = %service.id, points = raw.points.len()))]
    pub fn ingest_raw_response<S: AsRef<str>>(
        &self,
        raw: &RawResponse,
        service: &ServiceDefinition,
        requested: &[S],
        options: &NormalizeOptions,
    ) -> ForecastResult<NormalizedDataset> {
        check_axis("latitude", &raw.lats)?;
        check_axis("longitude", &raw.lons)?;
        if raw.points.is_empty() {
            return Err(ForecastError::malformed("no point payloads to normalize"));
        }

        let blocks = raw
            .points
            .iter()
            .map(|point| self.point_block(point, raw, service))
            .collect::<ForecastResult<Vec<_>>>()?;

        let times = self.time_axis(&raw.points, &blocks, service)?;
        debug!(steps = times.len(), first = %times[0], "Parsed time axis");

        let mut failures = BTreeMap::new();
        let mut wanted = Vec::new();
        for code in requested {
            match self.catalog.resolve(code.as_ref()) {
                Ok(def) => {
                    if !wanted.contains(&def.code) {
                        wanted.push(def.code);
                    }
                }
                Err(e) => {
                    failures.insert(code.as_ref().to_string(), e);
                }
            }
        }

        // Base variables first, including those only needed as dependencies
        let mut base_series: BTreeMap<&'static str, VariableSeries> = BTreeMap::new();
        let mut base_failures: BTreeMap<&'static str, ForecastError> = BTreeMap::new();
        for code in self.catalog.expand_with_dependencies(&wanted)? {
            match self.base_series(code, &times, &blocks, raw, service, options) {
                Ok(series) => {
                    base_series.insert(code, series);
                }
                Err(e) => {
                    warn!(variable = code, error = %e, "Variable could not be normalized");
                    base_failures.insert(code, e);
                }
            }
        }

        let mut dataset = GriddedDataset {
            location: options.location.clone(),
            service: service.id.clone(),
            forecast_run: options.forecast_run,
            crs: CrsCode::Epsg4326,
            resolution_m: options.resolution_m,
            time_delta_minutes: options.time_delta_minutes,
            lats: raw.lats.clone(),
            lons: raw.lons.clone(),
            variables: BTreeMap::new(),
        };

        // Derived variables strictly after every base series is final
        for code in wanted {
            let def = self.catalog.resolve(code)?;
            let result = match def.kind {
                VariableKind::Base => match base_series.get(code) {
                    Some(series) => Ok(series.clone()),
                    None => Err(base_failures
                        .get(code)
                        .cloned()
                        .unwrap_or_else(|| ForecastError::VariableNotIngested(code.to_string()))),
                },
                VariableKind::Derived { dependencies, .. } => {
                    derive_series(self.catalog, code, dependencies, &base_series)
                }
            };

            match result {
                Ok(series) => {
                    dataset.variables.insert(code.to_string(), series);
                }
                Err(e) => {
                    failures.insert(code.to_string(), e);
                }
            }
        }

        debug!(
            variables = dataset.variables.len(),
            failed = failures.len(),
            "Normalized dataset"
        );
        Ok(NormalizedDataset { dataset, failures })
    }

    fn point_block<'p>(
        &self,
        point: &'p PointPayload,
        raw: &RawResponse,
        service: &ServiceDefinition,
    ) -> ForecastResult<PointBlock<'p>> {
        let row = axis_index(&raw.lats, point.lat).ok_or_else(|| {
            ForecastError::malformed(format!("latitude {} is not on the grid", point.lat))
        })?;
        let col = axis_index(&raw.lons, point.lon).ok_or_else(|| {
            ForecastError::malformed(format!("longitude {} is not on the grid", point.lon))
        })?;

        let data = point
            .body
            .get(&service.response_key)
            .and_then(Value::as_object)
            .ok_or_else(|| {
                ForecastError::malformed(format!(
                    "response for ({}, {}) has no '{}' block",
                    point.lat, point.lon, service.response_key
                ))
            })?;

        Ok(PointBlock {
            row,
            col,
            data,
            units: point.body.get("units").and_then(Value::as_object),
        })
    }

    /// Parse the shared time axis, shifting local provider times to UTC.
    fn time_axis(
        &self,
        points: &[PointPayload],
        blocks: &[PointBlock<'_>],
        service: &ServiceDefinition,
    ) -> ForecastResult<Vec<DateTime<Utc>>> {
        let mut reference: Option<Vec<DateTime<Utc>>> = None;

        for (point, block) in points.iter().zip(blocks) {
            let raw_times = block
                .data
                .get("time")
                .and_then(Value::as_array)
                .ok_or_else(|| ForecastError::malformed("data block has no 'time' array"))?;

            let offset = utc_offset(&point.body);
            let times = raw_times
                .iter()
                .map(|v| {
                    let s = v
                        .as_str()
                        .ok_or_else(|| ForecastError::malformed(format!("time entry {} is not a string", v)))?;
                    parse_timestamp(s)
                        .map(|t| t - offset)
                        .map_err(|e| ForecastError::malformed(e.to_string()))
                })
                .collect::<ForecastResult<Vec<_>>>()?;

            match reference {
                None => reference = Some(times),
                Some(ref expected) if *expected != times => {
                    return Err(ForecastError::malformed(format!(
                        "time axis of point ({}, {}) differs from the first point",
                        point.lat, point.lon
                    )));
                }
                Some(_) => {}
            }
        }

        let times = reference.unwrap_or_default();
        if times.is_empty() {
            return Err(ForecastError::malformed("time axis is empty"));
        }

        let step = service.native_step();
        if let Some(pair) = times.windows(2).find(|w| w[1] - w[0] != step) {
            return Err(ForecastError::malformed(format!(
                "time axis is not spaced at the native {} minutes ({} -> {})",
                service.native_resolution_minutes, pair[0], pair[1]
            )));
        }

        Ok(times)
    }

    fn base_series(
        &self,
        code: &'static str,
        times: &[DateTime<Utc>],
        blocks: &[PointBlock<'_>],
        raw: &RawResponse,
        service: &ServiceDefinition,
        options: &NormalizeOptions,
    ) -> ForecastResult<VariableSeries> {
        let def = self.catalog.resolve(code)?;
        let (nx, ny) = (raw.lons.len(), raw.lats.len());
        let mut frames = vec![Grid::filled(nx, ny, f32::NAN); times.len()];

        let (conversion, unit) = resolve_unit(code, def.unit, blocks);

        let mut present = 0usize;
        for block in blocks {
            let Some(values) = block.data.get(code) else {
                continue;
            };
            let values = values.as_array().ok_or_else(|| {
                ForecastError::malformed(format!("'{}' is not an array", code))
            })?;
            if values.len() != times.len() {
                return Err(ForecastError::malformed(format!(
                    "'{}' has {} values for {} timestamps",
                    code,
                    values.len(),
                    times.len()
                )));
            }

            let cell = block.row * nx + block.col;
            for (t, value) in values.iter().enumerate() {
                frames[t].values[cell] = match value {
                    Value::Null => f32::NAN,
                    Value::Number(n) => n
                        .as_f64()
                        .map(|v| conversion.apply(v) as f32)
                        .unwrap_or(f32::NAN),
                    other => {
                        return Err(ForecastError::malformed(format!(
                            "'{}' contains non-numeric value {}",
                            code, other
                        )))
                    }
                };
            }
            present += 1;
        }

        if present == 0 {
            return Err(ForecastError::malformed(format!(
                "variable '{}' is absent from the payload",
                code
            )));
        }
        if present < blocks.len() {
            warn!(
                variable = code,
                present,
                points = blocks.len(),
                "Variable missing from some points, filling with NaN"
            );
        }

        let (times, frames) = match def.class {
            VariableClass::Accumulated => cumulative_to_incremental(times, &frames),
            _ => (times.to_vec(), frames),
        };

        let series = VariableSeries::new(unit, def.class, times, frames)?;
        if options.time_delta_minutes != service.native_resolution_minutes {
            return Ok(resample_series(&series, options.time_delta_minutes));
        }
        Ok(series)
    }
}

/// Compute a derived series over the timestamps all dependencies share.
pub(crate) fn derive_series(
    catalog: &VariableCatalog,
    code: &str,
    dependencies: &[&'static str],
    base_series: &BTreeMap<&'static str, VariableSeries>,
) -> ForecastResult<VariableSeries> {
    let def = catalog.resolve(code)?;
    let mut inputs = Vec::with_capacity(dependencies.len());
    for dep in dependencies {
        let series = base_series
            .get(dep)
            .ok_or_else(|| ForecastError::MissingDependency {
                variable: code.to_string(),
                dependency: dep.to_string(),
            })?;
        inputs.push((*dep, series));
    }

    let mut times = Vec::new();
    let mut frames = Vec::new();
    if let Some((_, first)) = inputs.first() {
        for time in &first.times {
            let grids: Option<BTreeMap<&str, &Grid>> = inputs
                .iter()
                .map(|(dep, series)| series.frame_at(time).map(|g| (*dep, g)))
                .collect();
            if let Some(grids) = grids {
                frames.push(catalog.compute_derived(code, &grids)?);
                times.push(*time);
            }
        }
    }

    VariableSeries::new(def.unit, def.class, times, frames)
}

/// Pick the unit conversion for a variable from the first point that
/// reports a unit for it.
fn resolve_unit(
    code: &str,
    canonical: &'static str,
    blocks: &[PointBlock<'_>],
) -> (UnitConversion, String) {
    let group = unit_group(code);
    let label = blocks.iter().find_map(|b| {
        let units = b.units?;
        units
            .get(code)
            .or_else(|| units.get(group))
            .and_then(Value::as_str)
    });

    match label {
        None => (UnitConversion::IDENTITY, canonical.to_string()),
        Some(label) => match conversion_to(label, canonical) {
            Some(conversion) => (conversion, canonical.to_string()),
            None => {
                warn!(variable = code, unit = label, "Unknown unit, keeping raw values");
                (UnitConversion::IDENTITY, label.to_string())
            }
        },
    }
}

/// Offset of provider-local times from UTC (`metadata.utc_timeoffset`, hours).
fn utc_offset(body: &Value) -> Duration {
    body.get("metadata")
        .and_then(|m| m.get("utc_timeoffset"))
        .and_then(Value::as_f64)
        .map(|hours| Duration::minutes((hours * 60.0).round() as i64))
        .unwrap_or_else(Duration::zero)
}

fn check_axis(name: &str, axis: &[f64]) -> ForecastResult<()> {
    if axis.is_empty() {
        return Err(ForecastError::malformed(format!("{} axis is empty", name)));
    }
    if axis.windows(2).any(|w| w[1] <= w[0]) {
        return Err(ForecastError::malformed(format!(
            "{} axis is not strictly ascending",
            name
        )));
    }
    Ok(())
}

fn axis_index(axis: &[f64], value: f64) -> Option<usize> {
    axis.iter().position(|&c| (c - value).abs() <= COORD_TOLERANCE)
}
