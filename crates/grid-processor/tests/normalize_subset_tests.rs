//! End-to-end tests of normalization followed by subsetting, using
//! synthetic Meteoblue responses for a 2x2 grid over Lake Como.

use chrono::{DateTime, Duration, Utc};
use forecast_common::{
    CoordRange, GriddedDataset, OutputTarget, RasterFormat, ServiceDefinition, SubsetRequest,
    TimeWindow, VariableCatalog,
};
use grid_processor::{GridNormalizer, NormalizeOptions, PointPayload, RawResponse, SpatioTemporalSubsetter};
use test_utils::{basic_point_body, scenario_run, SCENARIO_STEPS};

const LATS: [f64; 2] = [45.0, 46.0];
const LONS: [f64; 2] = [9.0, 10.0];

fn raw_response() -> RawResponse {
    let service = ServiceDefinition::basic_1h();
    let mut points = Vec::new();
    for lat in LATS {
        for lon in LONS {
            points.push(PointPayload {
                lat,
                lon,
                body: basic_point_body(&service.response_key, scenario_run(), 60, SCENARIO_STEPS, lat, lon),
            });
        }
    }
    RawResponse {
        lats: LATS.to_vec(),
        lons: LONS.to_vec(),
        points,
    }
}

fn normalize(variables: &[&str], time_delta_minutes: u32) -> GriddedDataset {
    let catalog = VariableCatalog::builtin();
    let normalized = GridNormalizer::new(&catalog)
        .ingest_raw_response(
            &raw_response(),
            &ServiceDefinition::basic_1h(),
            variables,
            &NormalizeOptions {
                location: "Lake_Como".to_string(),
                forecast_run: scenario_run(),
                resolution_m: 50_000,
                time_delta_minutes,
            },
        )
        .unwrap();
    assert!(normalized.failures.is_empty(), "{:?}", normalized.failures);
    normalized.dataset
}

fn request(variables: &[&str], lat: Option<(f64, f64)>, window: TimeWindow) -> SubsetRequest {
    SubsetRequest {
        variables: variables.iter().map(|s| s.to_string()).collect(),
        service: "basic-1h".to_string(),
        location: "Lake_Como".to_string(),
        lat_range: lat.map(|(min, max)| CoordRange::new(min, max)),
        lon_range: None,
        window,
        resolution_m: 50_000,
        time_delta_minutes: 60,
        format: RasterFormat::GeoTiff,
        output: OutputTarget::default(),
    }
}

fn hour(h: i64) -> DateTime<Utc> {
    scenario_run() + Duration::hours(h)
}

// ============================================================================
// Accumulation
// ============================================================================

#[test]
fn test_increments_reconstruct_cumulative_totals() {
    let dataset = normalize(&["precipitation"], 60);
    let series = dataset.variable("precipitation").unwrap();

    // first native step is dropped
    assert_eq!(series.times.len(), SCENARIO_STEPS - 1);
    assert_eq!(series.times[0], hour(1));

    // cumulative values of the (45, 9) point, which is row 0, column 0
    let body = basic_point_body("data_1h", scenario_run(), 60, SCENARIO_STEPS, 45.0, 9.0);
    let cumulative: Vec<f64> = body["data_1h"]["precipitation"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .collect();

    for (a, b) in [(0usize, 5usize), (3, 20), (10, 47)] {
        let summed: f64 = series.frames[a..=b].iter().map(|g| g.values[0] as f64).sum();
        let expected = cumulative[b + 1] - cumulative[a];
        assert!(
            (summed - expected).abs() < 1e-3,
            "window {}..={}: {} vs {}",
            a,
            b,
            summed,
            expected
        );
    }
}

// ============================================================================
// Resampling
// ============================================================================

#[test]
fn test_resampling_commutes_with_variable_selection() {
    let alone = normalize(&["precipitation"], 180);
    let together = normalize(&["precipitation", "temperature"], 180);

    let a = alone.variable("precipitation").unwrap();
    let b = together.variable("precipitation").unwrap();
    assert_eq!(a.times, b.times);
    for (fa, fb) in a.frames.iter().zip(&b.frames) {
        assert_eq!(fa.values, fb.values);
    }
}

#[test]
fn test_three_hour_bins_sum_hourly_increments() {
    let hourly = normalize(&["precipitation"], 60);
    let coarse = normalize(&["precipitation"], 180);
    let h = hourly.variable("precipitation").unwrap();
    let c = coarse.variable("precipitation").unwrap();

    // bin [03:00, 06:00) holds hourly steps 03, 04 and 05
    let bin = c.times.iter().position(|t| *t == hour(3)).unwrap();
    let start = h.times.iter().position(|t| *t == hour(3)).unwrap();
    let expected: f32 = h.frames[start..start + 3].iter().map(|g| g.values[3]).sum();
    assert!((c.frames[bin].values[3] - expected).abs() < 1e-4);
}

// ============================================================================
// Subsetting
// ============================================================================

#[test]
fn test_subset_points_stay_inside_request() {
    let catalog = VariableCatalog::builtin();
    let dataset = normalize(&["temperature"], 60);
    let subsetter = SpatioTemporalSubsetter::new(&catalog);

    let subset = subsetter
        .subset(
            &dataset,
            &request(&["temperature"], Some((45.5, 46.0)), TimeWindow::new(hour(2), hour(5))),
        )
        .unwrap();

    assert_eq!(subset.lats, vec![46.0]);
    assert_eq!(subset.lons, LONS.to_vec());
    let series = subset.variable("temperature").unwrap();
    assert_eq!(series.times, vec![hour(2), hour(3), hour(4), hour(5)]);
    assert!(series.frames.iter().all(|g| g.shape() == (2, 1)));
}

#[test]
fn test_derived_variable_computed_on_the_fly() {
    let catalog = VariableCatalog::builtin();
    let dataset = normalize(&["windspeed", "winddirection"], 60);
    assert!(dataset.variable("wind_u").is_none());

    let subset = SpatioTemporalSubsetter::new(&catalog)
        .subset(
            &dataset,
            &request(&["wind_u"], None, TimeWindow::one_day_from(hour(0))),
        )
        .unwrap();
    assert_eq!(subset.variable("wind_u").unwrap().len(), 25);
}

#[test]
fn test_renormalizing_is_deterministic() {
    let first = serde_json::to_vec(&normalize(&["precipitation", "temperature"], 60)).unwrap();
    let second = serde_json::to_vec(&normalize(&["precipitation", "temperature"], 60)).unwrap();
    assert_eq!(first, second);
}
