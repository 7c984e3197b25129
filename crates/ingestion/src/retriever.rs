//! Retrieval pipeline: stored dataset to raster artifacts.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use forecast_common::{
    ForecastError, ForecastResult, GriddedDataset, ServiceDefinition, SubsetRequest,
};
use grid_processor::SpatioTemporalSubsetter;
use raster::{write_atomic, RasterArtifact, RasterExporter};
use storage::{ArtifactPublisher, DatasetKey, DatasetStore};

use crate::context::PipelineContext;
use crate::ingester::IngestionPipeline;
use crate::report::{RunReport, VariableOutcome};
use crate::runs::{ForecastRunResolver, RunState};
use crate::status::{notify, notify_finished, JobState};
use crate::workspace::RunWorkspace;

/// Serves subset requests from stored datasets as GeoTIFF files.
#[derive(Clone)]
pub struct RetrievalPipeline {
    context: PipelineContext,
    store: DatasetStore,
    exporter: RasterExporter,
    publisher: Option<Arc<dyn ArtifactPublisher>>,
    ingestion: Option<IngestionPipeline>,
}

impl RetrievalPipeline {
    pub fn new(context: PipelineContext, store: DatasetStore) -> Self {
        Self {
            context,
            store,
            exporter: RasterExporter::new(),
            publisher: None,
            ingestion: None,
        }
    }

    /// Destination for requests that name a bucket.
    pub fn with_publisher(mut self, publisher: Arc<dyn ArtifactPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Pipeline used when no stored dataset covers a request.
    pub fn with_ingestion(mut self, ingestion: IngestionPipeline) -> Self {
        self.ingestion = Some(ingestion);
        self
    }

    pub fn with_exporter(mut self, exporter: RasterExporter) -> Self {
        self.exporter = exporter;
        self
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Run a retrieval and report its outcome. Never fails: errors end up
    /// in the report.
    pub async fn execute(&self, request: SubsetRequest) -> RunReport {
        let job_id = Uuid::new_v4();
        let reporter = self.context.reporter.as_ref();
        notify(
            reporter,
            job_id,
            JobState::Running,
            &format!("retrieving {} for {}", request.variables.join(","), request.location),
        )
        .await;

        let report = match self.retrieve(job_id, &request).await {
            Ok(report) => report,
            Err(e) => {
                if e.is_empty_selection() {
                    info!(job_id = %job_id, reason = %e, "Nothing to retrieve");
                } else {
                    error!(job_id = %job_id, error = %e, code = e.code(), "Retrieval failed");
                }
                RunReport::from_error(job_id, &e)
            }
        };

        notify_finished(reporter, &report).await;
        report
    }

    /// Retrieve every requested variable.
    ///
    /// Window, run and dataset problems fail the whole run; problems with a
    /// single variable only fail its outcome.
    #[instrument(skip(self, job_id, request), fields(job_id = %job_id, location = %request.location, service = %request.service))]
    pub async fn retrieve(&self, job_id: Uuid, request: &SubsetRequest) -> ForecastResult<RunReport> {
        let service = self.context.service(&request.service)?;
        let now = self.context.clock.now();
        let resolver = ForecastRunResolver::new(service);

        let window = resolver.check_window(&request.window, now)?;
        let run = resolver.select_run_for_request(window.start, now)?;
        let dataset = self.locate_dataset(service, request, run, now).await?;
        info!(
            run = %dataset.forecast_run,
            start = %window.start,
            end = %window.end,
            "Serving from dataset"
        );

        let request = SubsetRequest {
            window,
            ..request.clone()
        };
        let workspace = RunWorkspace::create(self.context.config.workspace_root.as_deref(), job_id)?;
        let subsetter = SpatioTemporalSubsetter::new(&self.context.catalog);

        let mut outcomes = Vec::with_capacity(request.variables.len());
        for variable in &request.variables {
            let outcome = match self
                .retrieve_variable(&subsetter, &dataset, &request, variable, &workspace)
                .await
            {
                Ok(artifact) => {
                    let outcome = VariableOutcome::success(variable, artifact.reference());
                    match artifact.bands.first() {
                        Some(band) => outcome.with_date(band.timestamp),
                        None => outcome,
                    }
                }
                Err(e) => {
                    warn!(variable = %variable, error = %e, code = e.code(), "Variable not retrieved");
                    VariableOutcome::failure(variable, &e)
                }
            };
            outcomes.push(outcome);
        }

        Ok(RunReport::from_outcomes(
            job_id,
            Some(dataset.forecast_run),
            outcomes,
        ))
    }

    /// Newest stored dataset at or before `run` that is still available,
    /// ingesting one first when allowed.
    async fn locate_dataset(
        &self,
        service: &ServiceDefinition,
        request: &SubsetRequest,
        run: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ForecastResult<GriddedDataset> {
        let resolver = ForecastRunResolver::new(service);
        let stored = self.store.list_runs(&service.id, &request.location).await?;
        let candidate = stored
            .iter()
            .rev()
            .find(|r| **r <= run && resolver.state(**r, now) == RunState::Available);

        if let Some(found) = candidate {
            if *found != run {
                debug!(requested = %run, found = %found, "Using an earlier stored run");
            }
            return self
                .store
                .load(&DatasetKey::new(&service.id, &request.location, *found))
                .await;
        }

        let fallback = match (&self.ingestion, request.to_ingest_request()) {
            (Some(ingestion), Some(ingest)) if self.context.config.fallback_ingestion => {
                Some((ingestion, ingest))
            }
            _ => None,
        };
        let Some((ingestion, ingest)) = fallback else {
            return Err(ForecastError::DatasetNotFound(format!(
                "no {} dataset for '{}' at or before run {}",
                service.id, request.location, run
            )));
        };

        info!(run = %run, "No stored dataset, ingesting first");
        let outcome = ingestion.ingest(&ingest).await?;
        if outcome.uri.is_none() {
            let reasons: Vec<String> = outcome
                .outcomes
                .iter()
                .filter_map(|o| o.message.clone())
                .collect();
            return Err(ForecastError::VariableNotIngested(format!(
                "{} ({})",
                request.variables.join(","),
                reasons.join("; ")
            )));
        }
        Ok(outcome.dataset)
    }

    async fn retrieve_variable(
        &self,
        subsetter: &SpatioTemporalSubsetter<'_>,
        dataset: &GriddedDataset,
        request: &SubsetRequest,
        variable: &str,
        workspace: &RunWorkspace,
    ) -> ForecastResult<RasterArtifact> {
        let subset = subsetter.subset_variable(dataset, request, variable)?;
        let mut artifact =
            self.exporter
                .export_to_dir(&subset, variable, request.format, workspace.path())?;
        let file_name = artifact
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ForecastError::Io(format!("bad artifact path {}", artifact.path.display())))?;
        let bytes = tokio::fs::read(&artifact.path).await?;

        if let Some(destination) = self.local_destination(request, variable, &file_name) {
            write_atomic(&destination, &bytes)?;
            info!(variable, path = %destination.display(), "Saved raster");
            artifact.path = destination;
        }

        if let Some(bucket) = &request.output.bucket {
            let publisher = self.publisher.as_ref().ok_or_else(|| {
                ForecastError::storage(format!("no publisher configured for {}", bucket))
            })?;
            let uri = publisher
                .publish(bucket, &file_name, Bytes::from(bytes))
                .await?;
            info!(variable, uri = %uri, "Published raster");
            artifact.uri = Some(uri);
        }

        Ok(artifact)
    }

    /// Local path for a variable's raster, `None` when it only goes to a
    /// bucket.
    ///
    /// An explicit `out` file is used as is for a single variable and gets a
    /// `__{variable}` suffix when several are requested.
    fn local_destination(
        &self,
        request: &SubsetRequest,
        variable: &str,
        file_name: &str,
    ) -> Option<PathBuf> {
        let output = &request.output;
        if let Some(out) = &output.out {
            if request.variables.len() == 1 {
                return Some(out.clone());
            }
            let stem = out.file_stem().and_then(|s| s.to_str()).unwrap_or("raster");
            let extension = out
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or(request.format.extension());
            return Some(out.with_file_name(format!("{}__{}.{}", stem, variable, extension)));
        }
        if let Some(dir) = &output.out_dir {
            return Some(dir.join(file_name));
        }
        if output.bucket.is_some() {
            return None;
        }
        Some(self.context.config.artifact_dir.join(file_name))
    }
}
