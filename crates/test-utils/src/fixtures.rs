//! Common test fixtures for forecast hub tests.
//!
//! Pre-defined scenarios shared by the crates' integration tests: a fixed
//! clock, the Lake Como test area and matching raw request parameters.

use chrono::{DateTime, TimeZone, Utc};

/// Common bounding box definitions for testing, as
/// `(min_lon, min_lat, max_lon, max_lat)`.
pub mod bbox {
    /// One degree square over Lake Como
    pub const LAKE_COMO: (f64, f64, f64, f64) = (9.0, 45.0, 10.0, 46.0);

    /// Small area inside `LAKE_COMO`
    pub const COMO_CITY: (f64, f64, f64, f64) = (9.05, 45.78, 9.12, 45.84);

    /// Area that does not overlap `LAKE_COMO`
    pub const ATLANTIC: (f64, f64, f64, f64) = (-30.0, 30.0, -29.0, 31.0);
}

/// The fixed "now" of the end-to-end scenario: 2026-01-27T03:00Z.
pub fn scenario_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 27, 3, 0, 0).single().unwrap_or_default()
}

/// The run that is current at [`scenario_now`] with a one hour latency.
pub fn scenario_run() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 27, 0, 0, 0).single().unwrap_or_default()
}

/// Number of hourly steps in the scenario payload (two days plus one).
pub const SCENARIO_STEPS: usize = 49;

/// Grid resolution large enough to keep the scenario grid small.
///
/// 50 km gives a step of 0.5 degrees, so two points per axis over
/// `LAKE_COMO`.
pub const SCENARIO_RESOLUTION_M: u32 = 50_000;

/// Raw string parameters as a caller would pass them.
pub mod params {
    pub const LAT_RANGE: &str = "45.0,46.0";
    pub const LONG_RANGE: &str = "9.0,10.0";
    pub const LAT_RANGE_REVERSED: &str = "46.0,45.0";
    pub const TIME_RANGE: &str = "2026-01-27T00:00:00,2026-01-28T00:00:00";
    pub const TIME_START_ONLY: &str = "2026-01-27T00:00:00";
    pub const LOCATION: &str = "Lake Como";
    pub const LOCATION_NORMALIZED: &str = "Lake_Como";
}

/// Temporary directory removed when the handle is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("meteoblue-hub-test-")
        .tempdir()
        .unwrap_or_else(|e| panic!("failed to create temp dir: {}", e))
}
