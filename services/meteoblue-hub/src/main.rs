//! Meteoblue hub command line host.
//!
//! Runs one ingestion or retrieval per invocation and prints its run report
//! as JSON on stdout. Logs go to stderr.

mod config;
mod sources;
mod status;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use forecast_common::VariableCatalog;
use ingestion::{
    load_service_table, IngestionPipeline, PipelineConfig, PipelineContext, ProcessAdapter,
    RawParams, RetrievalPipeline, RunReport, RunStatus,
};
use storage::{ArtifactPublisher, DatasetStore, ObjectStorage, S3Publisher};

use config::{HubConfig, StorageBackend};
use sources::MeteoblueClient;
use status::HttpStatusReporter;

#[derive(Parser, Debug)]
#[command(name = "meteoblue-hub")]
#[command(about = "Meteoblue forecast ingestion and GeoTIFF retrieval")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Services file extending the built-in service table
    #[arg(short, long, env = "SERVICES_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a bounding box for the current run and store it
    Ingest(ProcessArgs),
    /// Export stored forecasts as GeoTIFF rasters
    Retrieve(ProcessArgs),
}

#[derive(clap::Args, Debug)]
struct ProcessArgs {
    /// Comma separated variable codes
    #[arg(long)]
    variable: Option<String>,

    /// Meteoblue package (basic-5min or basic-1h)
    #[arg(long)]
    service: Option<String>,

    #[arg(long)]
    location_name: Option<String>,

    /// "min,max" latitude range
    #[arg(long, allow_hyphen_values = true)]
    lat_range: Option<String>,

    /// "min,max" longitude range
    #[arg(long, allow_hyphen_values = true)]
    long_range: Option<String>,

    /// Grid resolution in metres
    #[arg(long)]
    grid_res: Option<String>,

    /// Output time step in minutes
    #[arg(long)]
    time_delta: Option<String>,

    /// "start[,end]" ISO timestamps
    #[arg(long)]
    time_range: Option<String>,

    #[arg(long)]
    out_format: Option<String>,

    /// Output file, single variable only
    #[arg(long)]
    out: Option<String>,

    #[arg(long)]
    out_dir: Option<String>,

    /// s3://bucket[/prefix] to publish rasters to
    #[arg(long)]
    bucket_destination: Option<String>,
}

impl From<ProcessArgs> for RawParams {
    fn from(args: ProcessArgs) -> Self {
        RawParams {
            variable: args.variable,
            service: args.service,
            location_name: args.location_name,
            lat_range: args.lat_range,
            long_range: args.long_range,
            grid_res: args.grid_res,
            time_delta: args.time_delta,
            time_range: args.time_range,
            out_format: args.out_format,
            out: args.out,
            out_dir: args.out_dir,
            bucket_destination: args.bucket_destination,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let config = HubConfig::from_env()?;
    config.validate()?;
    let pipeline_config = PipelineConfig::from_env();
    pipeline_config.validate()?;

    let services = load_service_table(args.config.as_deref())?;
    let mut context = PipelineContext::new(VariableCatalog::builtin(), services)
        .with_config(pipeline_config.clone());
    if let Some(url) = &config.status_url {
        context = context.with_reporter(Arc::new(HttpStatusReporter::new(url.as_str())?));
    }

    let (storage, publisher) = open_storage(&config)?;
    let store = DatasetStore::new(storage, pipeline_config.storage_prefix.clone());
    info!(
        backend = ?config.backend,
        store = %store.storage().base_uri(),
        "Loaded configuration"
    );

    let ingestion = match &config.api_key {
        Some(key) => {
            let client = MeteoblueClient::new(key.as_str(), config.http_timeout, config.retry.clone())?;
            Some(IngestionPipeline::new(context.clone(), Arc::new(client), store.clone()))
        }
        None => None,
    };

    let report = match args.command {
        Command::Ingest(params) => {
            let Some(pipeline) = ingestion else {
                bail!("METEOBLUE_API_KEY is required to ingest");
            };
            run(&pipeline, params.into()).await
        }
        Command::Retrieve(params) => {
            let mut pipeline = RetrievalPipeline::new(context, store).with_publisher(publisher);
            match ingestion {
                Some(ingestion) => pipeline = pipeline.with_ingestion(ingestion),
                None => warn!("METEOBLUE_API_KEY not set, retrieval cannot ingest missing runs"),
            }
            run(&pipeline, params.into()).await
        }
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize run report")?
    );

    Ok(if report.status == RunStatus::Error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn run(process: &dyn ProcessAdapter, params: RawParams) -> RunReport {
    info!(process = process.name(), "Starting process");
    process.execute(params).await
}

/// Dataset storage plus the publisher used for bucket destinations.
fn open_storage(config: &HubConfig) -> Result<(ObjectStorage, Arc<dyn ArtifactPublisher>)> {
    match &config.backend {
        StorageBackend::S3 => {
            let storage = ObjectStorage::new(&config.storage)?;
            Ok((storage, Arc::new(S3Publisher::new(config.storage.clone()))))
        }
        StorageBackend::Local(root) => {
            let storage = ObjectStorage::local(root.clone())
                .with_context(|| format!("Failed to open local store {}", root.display()))?;
            Ok((storage.clone(), Arc::new(storage)))
        }
        StorageBackend::Memory => {
            let storage = ObjectStorage::in_memory();
            Ok((storage.clone(), Arc::new(storage)))
        }
    }
}
