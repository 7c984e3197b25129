//! Persistence of canonical gridded datasets.
//!
//! Datasets are stored as gzip-compressed deterministic JSON under
//! `{prefix}/datasets/{service}/{location}/{run}.json.gz`, one object per
//! (location, service, forecast run). Saving the same key again replaces
//! the object.

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use tracing::{debug, info, instrument};

use forecast_common::{ForecastError, ForecastResult, GriddedDataset};

use crate::object_store::ObjectStorage;

/// Format of the run component of dataset paths.
const RUN_FORMAT: &str = "%Y%m%dT%H%MZ";

/// File extension of stored datasets.
const EXTENSION: &str = ".json.gz";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Identity of a stored dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetKey {
    pub service: String,
    pub location: String,
    pub run: DateTime<Utc>,
}

impl DatasetKey {
    pub fn new(service: impl Into<String>, location: impl Into<String>, run: DateTime<Utc>) -> Self {
        Self {
            service: service.into(),
            location: location.into(),
            run,
        }
    }

    pub fn of(dataset: &GriddedDataset) -> Self {
        Self::new(&dataset.service, &dataset.location, dataset.forecast_run)
    }

    /// Directory holding every run of a (service, location).
    pub fn series_prefix(service: &str, location: &str) -> String {
        format!("datasets/{}/{}", service, location)
    }

    /// Object path, relative to the store prefix.
    pub fn path(&self) -> String {
        format!(
            "{}/{}{}",
            Self::series_prefix(&self.service, &self.location),
            self.run.format(RUN_FORMAT),
            EXTENSION
        )
    }

    /// Parse a path produced by [`DatasetKey::path`].
    pub fn parse(path: &str) -> Option<Self> {
        let rest = path.split("datasets/").last()?;
        let mut parts = rest.split('/');
        let service = parts.next()?;
        let location = parts.next()?;
        let file = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        let stamp = file.strip_suffix(EXTENSION)?;
        let run = NaiveDateTime::parse_from_str(stamp, RUN_FORMAT).ok()?.and_utc();
        Some(Self::new(service, location, run))
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.service,
            self.location,
            self.run.format(RUN_FORMAT)
        )
    }
}

/// Reads and writes canonical datasets in object storage.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    storage: ObjectStorage,
    prefix: String,
}

impl DatasetStore {
    pub fn new(storage: ObjectStorage, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    pub fn storage(&self) -> &ObjectStorage {
        &self.storage
    }

    fn full_path(&self, relative: &str) -> String {
        if self.prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.prefix, relative)
        }
    }

    /// Serialize a dataset exactly as it would be stored. The gzip header
    /// carries no timestamp, so equal datasets encode to equal bytes.
    pub fn encode(dataset: &GriddedDataset) -> ForecastResult<Vec<u8>> {
        let json = serde_json::to_vec(dataset)?;
        let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    }

    /// Inverse of [`DatasetStore::encode`]. Uncompressed JSON is accepted too.
    pub fn decode(bytes: &[u8]) -> ForecastResult<GriddedDataset> {
        if !bytes.starts_with(&GZIP_MAGIC) {
            return Ok(serde_json::from_slice(bytes)?);
        }
        let mut json = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut json)
            .map_err(|e| ForecastError::Serialization(format!("gzip error: {}", e)))?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Store a dataset under its key, replacing any previous version.
    #[instrument(skip(self, dataset), fields(key = %DatasetKey::of(dataset)))]
    pub async fn save(&self, dataset: &GriddedDataset) -> ForecastResult<String> {
        let key = DatasetKey::of(dataset);
        let bytes = Self::encode(dataset)?;
        let size = bytes.len();
        let uri = self
            .storage
            .put(&self.full_path(&key.path()), Bytes::from(bytes))
            .await?;
        info!(uri = %uri, size, variables = dataset.variables.len(), "Saved dataset");
        Ok(uri)
    }

    /// Load a dataset, failing with `DatasetNotFound` when absent.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn load(&self, key: &DatasetKey) -> ForecastResult<GriddedDataset> {
        let bytes = self
            .storage
            .get(&self.full_path(&key.path()))
            .await
            .map_err(|e| match e {
                ForecastError::DatasetNotFound(_) => ForecastError::DatasetNotFound(key.to_string()),
                other => other,
            })?;
        let dataset = Self::decode(&bytes)?;
        debug!(variables = dataset.variables.len(), "Loaded dataset");
        Ok(dataset)
    }

    pub async fn exists(&self, key: &DatasetKey) -> ForecastResult<bool> {
        self.storage.exists(&self.full_path(&key.path())).await
    }

    /// Stored runs of a (service, location), ascending.
    pub async fn list_runs(&self, service: &str, location: &str) -> ForecastResult<Vec<DateTime<Utc>>> {
        let prefix = self.full_path(&DatasetKey::series_prefix(service, location));
        let mut runs: Vec<DateTime<Utc>> = self
            .storage
            .list(&prefix)
            .await?
            .iter()
            .filter_map(|p| DatasetKey::parse(p))
            .filter(|k| k.service == service && k.location == location)
            .map(|k| k.run)
            .collect();
        runs.sort();
        runs.dedup();
        Ok(runs)
    }

    pub async fn delete(&self, key: &DatasetKey) -> ForecastResult<()> {
        self.storage.delete(&self.full_path(&key.path())).await
    }
}
