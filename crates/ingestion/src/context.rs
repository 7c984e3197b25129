//! Collaborators shared by the ingestion and retrieval pipelines.

use std::sync::Arc;

use forecast_common::{
    ForecastResult, ServiceDefinition, ServiceTable, ValidationError, ValidationKind,
    VariableCatalog,
};

use crate::clock::{Clock, SystemClock};
use crate::config::PipelineConfig;
use crate::status::{StatusReporter, TracingStatusReporter};
use crate::validation::RangeValidator;

/// Immutable tables plus the clock, reporter and tuning of a deployment.
///
/// Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct PipelineContext {
    pub catalog: Arc<VariableCatalog>,
    pub services: Arc<ServiceTable>,
    pub clock: Arc<dyn Clock>,
    pub reporter: Arc<dyn StatusReporter>,
    pub config: PipelineConfig,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("services", &self.services.ids())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new(VariableCatalog::builtin(), ServiceTable::builtin())
    }
}

impl PipelineContext {
    pub fn new(catalog: VariableCatalog, services: ServiceTable) -> Self {
        Self {
            catalog: Arc::new(catalog),
            services: Arc::new(services),
            clock: Arc::new(SystemClock),
            reporter: Arc::new(TracingStatusReporter),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn validator(&self) -> RangeValidator<'_> {
        RangeValidator::new(&self.catalog, &self.services)
    }

    /// Look up a service named by an already validated request.
    pub fn service(&self, id: &str) -> ForecastResult<&ServiceDefinition> {
        self.services.get(id).ok_or_else(|| {
            ValidationError::new(ValidationKind::UnknownService, format!("unknown service '{}'", id))
                .into()
        })
    }
}
