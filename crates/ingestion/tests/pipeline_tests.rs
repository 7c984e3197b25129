//! End-to-end tests of the ingestion and retrieval pipelines.
//!
//! The upstream API is replaced by a fetcher serving synthetic hourly
//! point bodies for the run at 2026-01-27T00:00Z, the clock is pinned to
//! 03:00Z and datasets live in an in-memory object store.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, TimeZone, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use forecast_common::{ForecastError, ForecastResult, ServiceDefinition};
use ingestion::{
    FixedClock, ForecastFetcher, IngestionPipeline, PipelineConfig, PipelineContext,
    ProcessAdapter, RawParams, RetrievalPipeline, RunReport, RunStatus,
};
use raster::decode_geotiff;
use storage::{DatasetKey, DatasetStore, ObjectStorage};
use test_utils::{
    basic_point_body, params, scenario_now, scenario_run, temp_test_dir, SCENARIO_RESOLUTION_M,
    SCENARIO_STEPS,
};

// ============================================================================
// Harness
// ============================================================================

#[derive(Default)]
struct MockMeteoblue {
    calls: AtomicUsize,
}

#[async_trait]
impl ForecastFetcher for MockMeteoblue {
    async fn fetch(&self, service: &ServiceDefinition, lat: f64, lon: f64) -> ForecastResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if service.id != "basic-1h" {
            return Err(ForecastError::UpstreamFetch(format!("no mock for {}", service.id)));
        }
        Ok(basic_point_body(
            &service.response_key,
            scenario_run(),
            service.native_resolution_minutes,
            SCENARIO_STEPS,
            lat,
            lon,
        ))
    }
}

struct Hub {
    ingestion: IngestionPipeline,
    retrieval: RetrievalPipeline,
    fetcher: Arc<MockMeteoblue>,
    storage: ObjectStorage,
    artifacts: ObjectStorage,
    out_dir: tempfile::TempDir,
}

impl Hub {
    fn new() -> Self {
        Self::with_fallback(false)
    }

    fn with_fallback(fallback_ingestion: bool) -> Self {
        let fetcher = Arc::new(MockMeteoblue::default());
        let storage = ObjectStorage::in_memory();
        let artifacts = ObjectStorage::in_memory();
        let out_dir = temp_test_dir();

        let context = PipelineContext::default()
            .with_clock(Arc::new(FixedClock(scenario_now())))
            .with_config(PipelineConfig {
                fallback_ingestion,
                workspace_root: Some(out_dir.path().join("work")),
                artifact_dir: out_dir.path().join("default"),
                ..Default::default()
            });
        let store = DatasetStore::new(storage.clone(), "hub");
        let ingestion = IngestionPipeline::new(context.clone(), fetcher.clone(), store.clone());
        let retrieval = RetrievalPipeline::new(context, store)
            .with_publisher(Arc::new(artifacts.clone()))
            .with_ingestion(ingestion.clone());

        Self {
            ingestion,
            retrieval,
            fetcher,
            storage,
            artifacts,
            out_dir,
        }
    }

    fn ingest_params(&self, variables: &str) -> RawParams {
        RawParams {
            variable: Some(variables.to_string()),
            service: Some("basic-1h".to_string()),
            location_name: Some(params::LOCATION.to_string()),
            lat_range: Some(params::LAT_RANGE.to_string()),
            long_range: Some(params::LONG_RANGE.to_string()),
            grid_res: Some(SCENARIO_RESOLUTION_M.to_string()),
            ..Default::default()
        }
    }

    fn retrieve_params(&self, variables: &str) -> RawParams {
        RawParams {
            time_range: Some(params::TIME_RANGE.to_string()),
            out_dir: Some(self.out_dir.path().join("out").display().to_string()),
            ..self.ingest_params(variables)
        }
    }

    async fn ingest(&self, variables: &str) -> RunReport {
        ProcessAdapter::execute(&self.ingestion, self.ingest_params(variables)).await
    }

    async fn retrieve(&self, params: RawParams) -> RunReport {
        ProcessAdapter::execute(&self.retrieval, params).await
    }
}

fn read_raster(report: &RunReport, index: usize) -> raster::GeoTiffImage {
    let path = report.outcomes[index]
        .reference
        .as_deref()
        .expect("artifact reference");
    decode_geotiff(&std::fs::read(path).expect("artifact on disk")).expect("valid GeoTIFF")
}

// ============================================================================
// Scenario
// ============================================================================

#[tokio::test]
async fn test_precipitation_day_has_24_bands() {
    let hub = Hub::new();

    let ingested = hub.ingest("precipitation").await;
    assert_eq!(ingested.status, RunStatus::Ok, "{}", ingested.message);
    assert_eq!(ingested.forecast_run, Some(scenario_run()));
    assert_eq!(hub.fetcher.calls.load(Ordering::SeqCst), 4);

    let report = hub.retrieve(hub.retrieve_params("precipitation")).await;
    assert_eq!(report.status, RunStatus::Ok, "{}", report.message);

    let reference = report.outcomes[0].reference.as_deref().unwrap();
    assert!(reference.ends_with("Meteoblue__Lake_Como__precipitation__2026-01-27T01:00:00.tif"));

    let image = read_raster(&report, 0);
    assert_eq!(image.band_count(), 24);
    assert_eq!(image.epsg, Some(4326));
    assert_eq!((image.width, image.height), (2, 2));
    assert_eq!(image.descriptions.first().map(String::as_str), Some("2026-01-27T01:00:00"));
    assert_eq!(image.descriptions.last().map(String::as_str), Some("2026-01-28T00:00:00"));
    for band in &image.bands {
        assert!(band.iter().all(|v| *v >= 0.0), "negative precipitation in {:?}", band);
    }
}

#[tokio::test]
async fn test_start_only_window_covers_one_day() {
    let hub = Hub::new();
    hub.ingest("precipitation").await;

    let params = RawParams {
        time_range: Some(params::TIME_START_ONLY.to_string()),
        ..hub.retrieve_params("precipitation")
    };
    let report = hub.retrieve(params).await;
    assert_eq!(report.status, RunStatus::Ok, "{}", report.message);
    assert_eq!(read_raster(&report, 0).band_count(), 24);
}

#[tokio::test]
async fn test_retrieval_is_byte_identical() {
    let hub = Hub::new();
    hub.ingest("temperature").await;

    let first = hub.retrieve(hub.retrieve_params("temperature")).await;
    let bytes_a = std::fs::read(first.outcomes[0].reference.as_deref().unwrap()).unwrap();
    let second = hub.retrieve(hub.retrieve_params("temperature")).await;
    let bytes_b = std::fs::read(second.outcomes[0].reference.as_deref().unwrap()).unwrap();

    assert_eq!(first.references(), second.references());
    assert_eq!(bytes_a, bytes_b);
}

#[tokio::test]
async fn test_reingest_is_byte_identical() {
    let hub = Hub::new();
    let key = DatasetKey::new("basic-1h", params::LOCATION_NORMALIZED, scenario_run());
    let path = format!("hub/{}", key.path());

    hub.ingest("precipitation,temperature").await;
    let first: Bytes = hub.storage.get(&path).await.unwrap();
    hub.ingest("precipitation,temperature").await;
    let second: Bytes = hub.storage.get(&path).await.unwrap();

    assert_eq!(first, second);
}

// ============================================================================
// Rejections
// ============================================================================

#[tokio::test]
async fn test_unsupported_resolution() {
    let hub = Hub::new();
    let params = RawParams {
        grid_res: Some("150".to_string()),
        ..hub.ingest_params("precipitation")
    };
    let report = ProcessAdapter::execute(&hub.ingestion, params).await;
    assert_eq!(report.status, RunStatus::Error);
    assert_eq!(report.error_code.as_deref(), Some("UnsupportedResolution"));
    assert_eq!(hub.fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reversed_latitude_range() {
    let hub = Hub::new();
    let params = RawParams {
        lat_range: Some(params::LAT_RANGE_REVERSED.to_string()),
        ..hub.retrieve_params("precipitation")
    };
    let report = hub.retrieve(params).await;
    assert_eq!(report.status, RunStatus::Error);
    assert_eq!(report.error_code.as_deref(), Some("InvalidOrder"));
    assert_eq!(hub.fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_window_outside_availability() {
    let hub = Hub::new();
    hub.ingest("precipitation").await;

    let start = scenario_now() + Duration::days(10);
    let params = RawParams {
        time_range: Some(format!(
            "{},{}",
            start.format("%Y-%m-%dT%H:%M:%S"),
            (start + Duration::days(1)).format("%Y-%m-%dT%H:%M:%S")
        )),
        ..hub.retrieve_params("precipitation")
    };
    let report = hub.retrieve(params).await;
    assert_eq!(report.status, RunStatus::Error);
    assert_eq!(report.error_code.as_deref(), Some("NoAvailableRun"));
}

// ============================================================================
// Partial outcomes
// ============================================================================

#[tokio::test]
async fn test_bbox_outside_coverage_is_skipped() {
    let hub = Hub::new();
    hub.ingest("precipitation").await;

    let params = RawParams {
        lat_range: Some("30.0,31.0".to_string()),
        long_range: Some("-30.0,-29.0".to_string()),
        ..hub.retrieve_params("precipitation")
    };
    let report = hub.retrieve(params).await;
    assert_eq!(report.status, RunStatus::Skipped);
    assert_eq!(report.error_code.as_deref(), Some("EmptySelection"));
}

#[tokio::test]
async fn test_missing_variable_is_partial() {
    let hub = Hub::new();
    hub.ingest("precipitation").await;

    let report = hub.retrieve(hub.retrieve_params("precipitation,temperature")).await;
    assert_eq!(report.status, RunStatus::Partial);
    assert!(report.outcomes[0].is_success());
    assert_eq!(report.outcomes[1].error_code.as_deref(), Some("VariableNotIngested"));
}

#[tokio::test]
async fn test_derived_variable_computed_on_retrieval() {
    let hub = Hub::new();
    hub.ingest("windspeed,winddirection").await;

    let report = hub.retrieve(hub.retrieve_params("wind_u")).await;
    assert_eq!(report.status, RunStatus::Ok, "{}", report.message);
    // instantaneous: every hour of the inclusive window
    assert_eq!(read_raster(&report, 0).band_count(), 25);
}

#[tokio::test]
async fn test_coarser_time_delta() {
    let hub = Hub::new();
    hub.ingest("precipitation").await;

    let params = RawParams {
        time_delta: Some("180".to_string()),
        ..hub.retrieve_params("precipitation")
    };
    let report = hub.retrieve(params).await;
    assert_eq!(report.status, RunStatus::Ok, "{}", report.message);
    assert_eq!(
        report.outcomes[0].date,
        Some(Utc.with_ymd_and_hms(2026, 1, 27, 0, 0, 0).unwrap())
    );
    // three-hour bins labelled 00:00 through 00:00 next day
    assert_eq!(read_raster(&report, 0).band_count(), 9);
}

// ============================================================================
// Storage paths
// ============================================================================

#[tokio::test]
async fn test_fallback_ingestion_when_nothing_stored() {
    let hub = Hub::with_fallback(true);
    let report = hub.retrieve(hub.retrieve_params("precipitation")).await;
    assert_eq!(report.status, RunStatus::Ok, "{}", report.message);
    assert_eq!(hub.fetcher.calls.load(Ordering::SeqCst), 4);

    let key = DatasetKey::new("basic-1h", params::LOCATION_NORMALIZED, scenario_run());
    assert!(hub.storage.exists(&format!("hub/{}", key.path())).await.unwrap());
}

#[tokio::test]
async fn test_no_dataset_without_fallback() {
    let hub = Hub::new();
    let report = hub.retrieve(hub.retrieve_params("precipitation")).await;
    assert_eq!(report.status, RunStatus::Error);
    assert_eq!(report.error_code.as_deref(), Some("DatasetNotFound"));
    assert_eq!(hub.fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_publish_to_bucket() {
    let hub = Hub::new();
    hub.ingest("precipitation").await;

    let params = RawParams {
        out_dir: None,
        bucket_destination: Some("s3://artifacts/como".to_string()),
        ..hub.retrieve_params("precipitation")
    };
    let report = hub.retrieve(params).await;
    assert_eq!(report.status, RunStatus::Ok, "{}", report.message);

    let uri = report.outcomes[0].reference.as_deref().unwrap();
    assert_eq!(
        uri,
        "memory://store/como/Meteoblue__Lake_Como__precipitation__2026-01-27T01:00:00.tif"
    );
    let bytes = hub.artifacts.get(uri).await.unwrap();
    assert_eq!(decode_geotiff(&bytes).unwrap().band_count(), 24);
    // bucket only: nothing written locally
    assert!(!hub.out_dir.path().join("default").exists());
}

#[tokio::test]
async fn test_workspaces_are_cleaned_up() {
    let hub = Hub::new();
    hub.ingest("precipitation").await;
    hub.retrieve(hub.retrieve_params("precipitation")).await;

    let work = hub.out_dir.path().join("work");
    let leftovers = std::fs::read_dir(&work).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);
}
