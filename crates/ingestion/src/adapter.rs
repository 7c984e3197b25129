//! Host-facing entry point.
//!
//! A host framework (CLI, job runner, web process server) hands over the raw
//! string parameters it received and gets a [`RunReport`] back. Validation
//! failures are reported the same way as run failures.

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use forecast_common::ForecastError;

use crate::ingester::IngestionPipeline;
use crate::report::RunReport;
use crate::retriever::RetrievalPipeline;
use crate::validation::RawParams;

#[async_trait]
pub trait ProcessAdapter: Send + Sync {
    /// Process identifier exposed to hosts.
    fn name(&self) -> &'static str;

    async fn execute(&self, params: RawParams) -> RunReport;
}

fn rejected(process: &str, error: ForecastError) -> RunReport {
    warn!(process, error = %error, code = error.code(), "Request rejected");
    RunReport::from_error(Uuid::new_v4(), &error)
}

#[async_trait]
impl ProcessAdapter for IngestionPipeline {
    fn name(&self) -> &'static str {
        "meteoblue-ingestor"
    }

    async fn execute(&self, params: RawParams) -> RunReport {
        let validated = self.context().validator().validate_ingest(&params);
        match validated {
            Ok(request) => IngestionPipeline::execute(self, request).await,
            Err(e) => rejected(self.name(), e.into()),
        }
    }
}

#[async_trait]
impl ProcessAdapter for RetrievalPipeline {
    fn name(&self) -> &'static str {
        "meteoblue-retriever"
    }

    async fn execute(&self, params: RawParams) -> RunReport {
        let validated = self.context().validator().validate(&params);
        match validated {
            Ok(request) => RetrievalPipeline::execute(self, request).await,
            Err(e) => rejected(self.name(), e.into()),
        }
    }
}
