//! Ingestion pipeline: upstream points to a stored canonical dataset.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use forecast_common::{
    ForecastError, ForecastResult, GriddedDataset, IngestRequest, ServiceDefinition,
};
use grid_processor::{GridNormalizer, NormalizeOptions, PointPayload, RawResponse};
use storage::DatasetStore;

use crate::context::PipelineContext;
use crate::fetch::ForecastFetcher;
use crate::points::GridPoints;
use crate::report::{RunReport, VariableOutcome};
use crate::runs::ForecastRunResolver;
use crate::status::{notify, notify_finished, JobState};

/// What one ingestion produced.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub forecast_run: DateTime<Utc>,
    /// The dataset as stored; holds only the variables that succeeded
    pub dataset: GriddedDataset,
    /// Stored dataset URI, `None` when no variable succeeded
    pub uri: Option<String>,
    /// One entry per requested variable, in request order
    pub outcomes: Vec<VariableOutcome>,
}

/// Fetches a grid of points for the current run, normalizes them and
/// stores the canonical dataset.
#[derive(Clone)]
pub struct IngestionPipeline {
    context: PipelineContext,
    fetcher: Arc<dyn ForecastFetcher>,
    store: DatasetStore,
}

impl IngestionPipeline {
    pub fn new(context: PipelineContext, fetcher: Arc<dyn ForecastFetcher>, store: DatasetStore) -> Self {
        Self {
            context,
            fetcher,
            store,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    /// Run an ingestion and report its outcome. Never fails: errors end up
    /// in the report.
    pub async fn execute(&self, request: IngestRequest) -> RunReport {
        let job_id = Uuid::new_v4();
        let reporter = self.context.reporter.as_ref();
        notify(
            reporter,
            job_id,
            JobState::Running,
            &format!("ingesting {} for {}", request.variables.join(","), request.location),
        )
        .await;

        let report = match self.ingest(&request).await {
            Ok(outcome) => RunReport::from_outcomes(job_id, Some(outcome.forecast_run), outcome.outcomes),
            Err(e) => {
                error!(job_id = %job_id, error = %e, code = e.code(), "Ingestion failed");
                RunReport::from_error(job_id, &e)
            }
        };

        notify_finished(reporter, &report).await;
        report
    }

    /// Ingest the run that is current now.
    ///
    /// Fails as a whole on run selection, fetch (every point failed),
    /// malformed payloads and storage errors. Variables that could not be
    /// normalized are reported in the outcome.
    #[instrument(skip(self, request), fields(location = %request.location, service = %request.service))]
    pub async fn ingest(&self, request: &IngestRequest) -> ForecastResult<IngestOutcome> {
        let service = self.context.service(&request.service)?;
        let now = self.context.clock.now();
        let run = ForecastRunResolver::new(service).select_run_for_request(now, now)?;

        let points = GridPoints::from_bbox(&request.bbox, request.resolution_m);
        info!(
            run = %run,
            lats = points.lats.len(),
            lons = points.lons.len(),
            "Fetching grid points"
        );
        let raw = self.fetch_points(service, &points).await?;

        let normalized = GridNormalizer::new(&self.context.catalog).ingest_raw_response(
            &raw,
            service,
            &request.variables,
            &NormalizeOptions {
                location: request.location.clone(),
                forecast_run: run,
                resolution_m: request.resolution_m,
                time_delta_minutes: request.time_delta_minutes,
            },
        )?;
        let dataset = normalized.dataset;

        let uri = if dataset.variables.is_empty() {
            warn!("No variable could be normalized, nothing stored");
            None
        } else {
            Some(self.store.save(&dataset).await?)
        };

        let outcomes = request
            .variables
            .iter()
            .map(|code| match (dataset.variable(code), &uri) {
                (Some(series), Some(uri)) => {
                    let outcome = VariableOutcome::success(code, uri);
                    match series.times.first() {
                        Some(first) => outcome.with_date(*first),
                        None => outcome,
                    }
                }
                _ => {
                    let e = normalized
                        .failures
                        .get(code)
                        .cloned()
                        .unwrap_or_else(|| ForecastError::VariableNotIngested(code.clone()));
                    VariableOutcome::failure(code, &e)
                }
            })
            .collect();

        Ok(IngestOutcome {
            forecast_run: run,
            dataset,
            uri,
            outcomes,
        })
    }

    /// Fetch every grid point, a bounded number at a time.
    ///
    /// Failed points are left out and become NaN cells; the fetch fails only
    /// when no point succeeded.
    async fn fetch_points(
        &self,
        service: &ServiceDefinition,
        points: &GridPoints,
    ) -> ForecastResult<RawResponse> {
        let concurrency = self.context.config.fetch_concurrency.max(1);
        let results: Vec<(f64, f64, ForecastResult<serde_json::Value>)> = stream::iter(points.iter())
            .map(|(lat, lon)| async move { (lat, lon, self.fetcher.fetch(service, lat, lon).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let total = results.len();
        let mut payloads = Vec::with_capacity(total);
        let mut last_error = None;
        for (lat, lon, result) in results {
            match result {
                Ok(body) => payloads.push(PointPayload { lat, lon, body }),
                Err(e) => {
                    warn!(lat, lon, error = %e, "Grid point fetch failed");
                    last_error = Some(e);
                }
            }
        }

        if payloads.is_empty() {
            let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
            return Err(ForecastError::UpstreamFetch(format!(
                "all {} grid points failed: {}",
                total, reason
            )));
        }
        if payloads.len() < total {
            warn!(failed = total - payloads.len(), total, "Some grid points are missing");
        }

        // Completion order is arbitrary; keep the payload order stable
        payloads.sort_by(|a, b| a.lat.total_cmp(&b.lat).then(a.lon.total_cmp(&b.lon)));

        Ok(RawResponse {
            lats: points.lats.clone(),
            lons: points.lons.clone(),
            points: payloads,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use forecast_common::BoundingBox;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storage::ObjectStorage;
    use test_utils::{basic_point_body, scenario_now, scenario_run, SCENARIO_STEPS};

    use crate::clock::FixedClock;
    use crate::report::RunStatus;

    struct PointFetcher {
        calls: AtomicUsize,
        fails: fn(f64, f64) -> bool,
    }

    #[async_trait]
    impl ForecastFetcher for PointFetcher {
        async fn fetch(&self, service: &ServiceDefinition, lat: f64, lon: f64) -> ForecastResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if (self.fails)(lat, lon) {
                return Err(ForecastError::UpstreamFetch("HTTP 503".into()));
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

    fn pipeline(fails: fn(f64, f64) -> bool) -> (IngestionPipeline, Arc<PointFetcher>) {
        let fetcher = Arc::new(PointFetcher {
            calls: AtomicUsize::new(0),
            fails,
        });
        let context = PipelineContext::default().with_clock(Arc::new(FixedClock(scenario_now())));
        let store = DatasetStore::new(ObjectStorage::in_memory(), "test");
        (IngestionPipeline::new(context, fetcher.clone(), store), fetcher)
    }

    fn request(variables: &[&str]) -> IngestRequest {
        IngestRequest {
            variables: variables.iter().map(|s| s.to_string()).collect(),
            service: "basic-1h".into(),
            location: "Lake_Como".into(),
            bbox: BoundingBox::new(9.0, 45.0, 10.0, 46.0),
            resolution_m: 50_000,
            time_delta_minutes: 60,
        }
    }

    #[tokio::test]
    async fn test_ingest_stores_dataset() {
        let (pipeline, fetcher) = pipeline(|_, _| false);
        let outcome = pipeline.ingest(&request(&["precipitation"])).await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.forecast_run, scenario_run());
        assert_eq!(outcome.dataset.lats, vec![45.0, 46.0]);
        assert!(outcome.uri.as_deref().unwrap().ends_with("20260127T0000Z.json.gz"));
        assert!(outcome.outcomes[0].is_success());
        assert!(pipeline
            .store()
            .exists(&storage::DatasetKey::of(&outcome.dataset))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_failed_points_become_nan() {
        let (pipeline, _) = pipeline(|lat, _| lat > 45.5);
        let outcome = pipeline.ingest(&request(&["temperature"])).await.unwrap();
        let frame = &outcome.dataset.variables["temperature"].frames[0];
        // south row present, north row missing
        assert!(!frame.values[0].is_nan() && !frame.values[1].is_nan());
        assert!(frame.values[2].is_nan() && frame.values[3].is_nan());
    }

    #[tokio::test]
    async fn test_all_points_failing_is_upstream_error() {
        let (pipeline, fetcher) = pipeline(|_, _| true);
        let report = pipeline.execute(request(&["precipitation"])).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);
        assert_eq!(report.status, RunStatus::Error);
        assert_eq!(report.error_code.as_deref(), Some("UpstreamFetchError"));
        assert!(!pipeline
            .store()
            .exists(&storage::DatasetKey::new("basic-1h", "Lake_Como", scenario_run()))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_derived_variable_from_fetched_bases() {
        let (pipeline, _) = pipeline(|_, _| false);
        let report = pipeline
            .execute(request(&["precipitation", "dewpoint"]))
            .await;
        // basic payload has temperature and relative humidity, so dewpoint derives
        assert_eq!(report.status, RunStatus::Ok);
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes.iter().all(|o| o.date.is_some()));
    }
}
