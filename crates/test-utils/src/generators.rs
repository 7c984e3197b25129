//! Test data generators for creating synthetic forecast data.
//!
//! These generators create predictable, verifiable patterns, both as plain
//! grids and as Meteoblue-shaped JSON responses for single grid points.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0);
/// assert_eq!(grid[10], 1.0);
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a temperature-like grid in degrees Celsius (-10 to 30).
pub fn create_temperature_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x_factor = col as f32 / width.max(1) as f32;
            let y_factor = row as f32 / height.max(1) as f32;
            data.push(-10.0 + x_factor * 20.0 + y_factor * 20.0);
        }
    }
    data
}

/// Creates a grid with NaN at the given `(col, row)` positions, zeros elsewhere.
pub fn create_grid_with_nans(
    width: usize,
    height: usize,
    nan_positions: &[(usize, usize)],
) -> Vec<f32> {
    let mut data = vec![0.0f32; width * height];
    for &(col, row) in nan_positions {
        if col < width && row < height {
            data[row * width + col] = f32::NAN;
        }
    }
    data
}

/// Running precipitation total: `rate * (step % 3)` mm is added at each step.
///
/// The first value is zero, so increments are `0, rate, 2*rate, 0, ...`
/// shifted by one step.
pub fn cumulative_precipitation(steps: usize, rate: f64) -> Vec<f64> {
    let mut total = 0.0;
    (0..steps)
        .map(|i| {
            total += rate * (i % 3) as f64;
            total
        })
        .collect()
}

/// Builder for a Meteoblue package response at one grid point.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use test_utils::MeteoblueBody;
///
/// let start = Utc.with_ymd_and_hms(2026, 1, 27, 0, 0, 0).unwrap();
/// let body = MeteoblueBody::hourly(start, 3)
///     .unit("temperature", "C")
///     .series("temperature", [1.0, 2.0, 3.0])
///     .build();
/// assert_eq!(body["data_1h"]["time"][2], "2026-01-27 02:00");
/// ```
#[derive(Debug, Clone)]
pub struct MeteoblueBody {
    data_key: String,
    start: DateTime<Utc>,
    step_minutes: i64,
    steps: usize,
    utc_offset_hours: f64,
    lat: f64,
    lon: f64,
    units: Map<String, Value>,
    series: BTreeMap<String, Vec<Value>>,
}

impl MeteoblueBody {
    pub fn new(data_key: &str, start: DateTime<Utc>, step_minutes: u32, steps: usize) -> Self {
        Self {
            data_key: data_key.to_string(),
            start,
            step_minutes: i64::from(step_minutes),
            steps,
            utc_offset_hours: 0.0,
            lat: 0.0,
            lon: 0.0,
            units: Map::new(),
            series: BTreeMap::new(),
        }
    }

    /// `basic-1h` response (`data_1h`).
    pub fn hourly(start: DateTime<Utc>, steps: usize) -> Self {
        Self::new("data_1h", start, 60, steps)
    }

    /// `basic-5min` response (`data_xmin`).
    pub fn five_minute(start: DateTime<Utc>, steps: usize) -> Self {
        Self::new("data_xmin", start, 5, steps)
    }

    pub fn at(mut self, lat: f64, lon: f64) -> Self {
        self.lat = lat;
        self.lon = lon;
        self
    }

    /// Report times in local time `hours` ahead of UTC.
    pub fn utc_offset(mut self, hours: f64) -> Self {
        self.utc_offset_hours = hours;
        self
    }

    pub fn unit(mut self, key: &str, label: &str) -> Self {
        self.units.insert(key.to_string(), json!(label));
        self
    }

    /// Units the provider reports for the basic packages.
    pub fn default_units(self) -> Self {
        self.unit("time", "YYYY-MM-DD hh:mm")
            .unit("temperature", "C")
            .unit("windspeed", "ms-1")
            .unit("winddirection", "degree")
            .unit("precipitation", "mm")
            .unit("precipitation_probability", "percent")
            .unit("relativehumidity", "percent")
            .unit("pressure", "hPa")
    }

    pub fn series(mut self, name: &str, values: impl IntoIterator<Item = f64>) -> Self {
        let values: Vec<Value> = values.into_iter().map(|v| json!(v)).collect();
        self.series.insert(name.to_string(), values);
        self
    }

    /// Series computed from the step index.
    pub fn series_fn(self, name: &str, f: impl Fn(usize) -> f64) -> Self {
        let steps = self.steps;
        self.series(name, (0..steps).map(f))
    }

    /// Replace one value of an existing series with `null`.
    pub fn null_at(mut self, name: &str, index: usize) -> Self {
        if let Some(slot) = self.series.get_mut(name).and_then(|s| s.get_mut(index)) {
            *slot = Value::Null;
        }
        self
    }

    /// Timestamps as the provider writes them, in local time.
    pub fn times(&self) -> Vec<String> {
        let offset = Duration::minutes((self.utc_offset_hours * 60.0).round() as i64);
        (0..self.steps)
            .map(|i| {
                let t = self.start + offset + Duration::minutes(self.step_minutes * i as i64);
                t.format("%Y-%m-%d %H:%M").to_string()
            })
            .collect()
    }

    pub fn build(self) -> Value {
        let mut data = Map::new();
        data.insert("time".to_string(), json!(self.times()));
        for (name, values) in self.series {
            data.insert(name, Value::Array(values));
        }

        let mut body = Map::new();
        body.insert(
            "metadata".to_string(),
            json!({
                "name": "",
                "latitude": self.lat,
                "longitude": self.lon,
                "height": 200,
                "timezone_abbrevation": "UTC",
                "utc_timeoffset": self.utc_offset_hours,
                "modelrun_utc": self.start.format("%Y-%m-%d %H:%M").to_string(),
            }),
        );
        body.insert("units".to_string(), Value::Object(self.units));
        body.insert(self.data_key, Value::Object(data));
        Value::Object(body)
    }
}

/// A full basic-package response with every base variable.
///
/// Values vary smoothly with position and step so neighbouring points
/// differ; precipitation is a running total.
pub fn basic_point_body(
    data_key: &str,
    start: DateTime<Utc>,
    step_minutes: u32,
    steps: usize,
    lat: f64,
    lon: f64,
) -> Value {
    let spatial = (lat - lat.floor()) + (lon - lon.floor());
    let precip = cumulative_precipitation(steps, 0.2 + spatial * 0.1);
    let convective: Vec<f64> = precip.iter().map(|p| p * 0.25).collect();

    MeteoblueBody::new(data_key, start, step_minutes, steps)
        .at(lat, lon)
        .default_units()
        .series("precipitation", precip)
        .series("convective_precipitation", convective)
        .series_fn("temperature", |i| 2.0 + spatial + (i % 24) as f64 * 0.5)
        .series_fn("felttemperature", |i| spatial + (i % 24) as f64 * 0.5)
        .series_fn("windspeed", |i| 1.0 + (i % 6) as f64)
        .series_fn("winddirection", |i| ((i * 30) % 360) as f64)
        .series_fn("relativehumidity", |i| 60.0 + (i % 10) as f64 * 3.0)
        .series_fn("sealevelpressure", |i| 1010.0 + (i % 5) as f64)
        .series_fn("snowfraction", |_| 0.0)
        .series_fn("precipitation_probability", |i| ((i * 7) % 100) as f64)
        .series_fn("rainspot", |_| 0.0)
        .series_fn("pictocode", |i| (1 + i % 17) as f64)
        .series_fn("isdaylight", |i| if (6..18).contains(&(i % 24)) { 1.0 } else { 0.0 })
        .series_fn("uvindex", |i| (i % 8) as f64)
        .build()
}
