//! Integration tests for raster export.
//!
//! Builds datasets from the shared generators, exports them and reads the
//! files back to check georeferencing, band order and nodata handling.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;

use forecast_common::{CrsCode, Grid, GriddedDataset, RasterFormat, VariableClass, VariableSeries};
use raster::{decode_geotiff, RasterExporter, NODATA_VALUE};
use test_utils::{
    assert_all, assert_approx_eq, assert_coords_approx_eq, create_grid_with_nans,
    create_test_grid, temp_test_dir,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 27, 1, 0, 0).unwrap()
}

fn dataset(nx: usize, ny: usize, steps: usize) -> GriddedDataset {
    let times: Vec<_> = (0..steps).map(|i| t0() + Duration::hours(i as i64)).collect();
    let frames = (0..steps)
        .map(|i| {
            let values = create_test_grid(nx, ny)
                .into_iter()
                .map(|v| v + i as f32)
                .collect();
            Grid::new(nx, ny, values).unwrap()
        })
        .collect();

    let mut variables = BTreeMap::new();
    variables.insert(
        "temperature".to_string(),
        VariableSeries::new("degC", VariableClass::Instantaneous, times, frames).unwrap(),
    );

    GriddedDataset {
        location: "Lake_Como".to_string(),
        service: "basic-1h".to_string(),
        forecast_run: Utc.with_ymd_and_hms(2026, 1, 27, 0, 0, 0).unwrap(),
        crs: CrsCode::Epsg4326,
        resolution_m: 10_000,
        time_delta_minutes: 60,
        lats: (0..ny).map(|i| 45.0 + i as f64 * 0.1).collect(),
        lons: (0..nx).map(|i| 9.0 + i as f64 * 0.1).collect(),
        variables,
    }
}

// ============================================================================
// Georeferencing
// ============================================================================

#[test]
fn test_pixel_centres_match_grid_points() {
    let ds = dataset(5, 4, 3);
    let dir = temp_test_dir();
    let artifact = RasterExporter::new()
        .export_to_dir(&ds, "temperature", RasterFormat::GeoTiff, dir.path())
        .unwrap();

    // top-left pixel is the north-west grid point
    let (lon, lat) = artifact.transform.pixel_center(0, 0);
    assert_coords_approx_eq!((lon, lat), (9.0, 45.3), 1e-9);

    let (lon, lat) = artifact.transform.pixel_center(3, 4);
    assert_coords_approx_eq!((lon, lat), (9.4, 45.0), 1e-9);

    let gdal = artifact.transform.to_gdal();
    assert_approx_eq!(gdal[0], 8.95, 1e-9);
    assert_approx_eq!(gdal[3], 45.35, 1e-9);
    assert!(gdal[5] < 0.0);
}

#[test]
fn test_file_matches_artifact() {
    let ds = dataset(3, 2, 24);
    let dir = temp_test_dir();
    let artifact = RasterExporter::new()
        .export_to_dir(&ds, "temperature", RasterFormat::GeoTiff, dir.path())
        .unwrap();

    let image = decode_geotiff(&std::fs::read(&artifact.path).unwrap()).unwrap();
    assert_eq!(image.band_count(), 24);
    assert_eq!(artifact.band_count(), 24);
    assert_eq!(image.epsg, Some(4326));
    assert_eq!(image.transform, Some(artifact.transform));
    assert_eq!((image.width, image.height), (3, 2));

    for (band, info) in artifact.bands.iter().enumerate() {
        assert_eq!(info.index, band + 1);
        assert_eq!(
            image.descriptions[band],
            info.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string()
        );
    }
    // chronological
    assert!(artifact.bands.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

// ============================================================================
// Values
// ============================================================================

#[test]
fn test_values_are_north_up() {
    let ds = dataset(2, 3, 1);
    let (bytes, _) = RasterExporter::new().encode(&ds, "temperature").unwrap();
    let image = decode_geotiff(&bytes).unwrap();

    // create_test_grid: col * 1000 + row, rows south to north
    assert_eq!(image.bands[0], vec![2.0, 1002.0, 1.0, 1001.0, 0.0, 1000.0]);
}

#[test]
fn test_nan_cells_become_nodata() {
    let mut ds = dataset(3, 3, 1);
    let series = ds.variables.get_mut("temperature").unwrap();
    series.frames[0] = Grid::new(3, 3, create_grid_with_nans(3, 3, &[(0, 0), (2, 2)])).unwrap();

    let (bytes, _) = RasterExporter::new().encode(&ds, "temperature").unwrap();
    let image = decode_geotiff(&bytes).unwrap();
    let band = &image.bands[0];

    assert_eq!(image.nodata, Some(NODATA_VALUE));
    // (2, 2) is the north-east corner, first row in the file
    assert_eq!(band[2], NODATA_VALUE);
    // (0, 0) is the south-west corner, last row in the file
    assert_eq!(band[6], NODATA_VALUE);
    assert_eq!(band.iter().filter(|&&v| v == NODATA_VALUE).count(), 2);
    assert_all!(band, |v: f32| !v.is_nan());
}

#[test]
fn test_single_row_subset_uses_resolution() {
    let mut ds = dataset(4, 3, 2);
    ds.lats.truncate(1);
    let series = ds.variables.get_mut("temperature").unwrap();
    for frame in &mut series.frames {
        *frame = frame.select(&[0], &[0, 1, 2, 3]);
    }

    let (_, layout) = RasterExporter::new().encode(&ds, "temperature").unwrap();
    assert_eq!(layout.height, 1);
    // 10 km -> 0.1 degrees
    assert_approx_eq!(layout.transform.pixel_height, 0.1, 1e-12);
}

#[test]
fn test_reexport_is_byte_identical() {
    let ds = dataset(6, 5, 12);
    let dir = temp_test_dir();
    let a = dir.path().join("a.tif");
    let b = dir.path().join("b.tif");
    let exporter = RasterExporter::new();
    exporter.export(&ds, "temperature", RasterFormat::GeoTiff, &a).unwrap();
    exporter.export(&ds, "temperature", RasterFormat::GeoTiff, &b).unwrap();
    assert_eq!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
}
