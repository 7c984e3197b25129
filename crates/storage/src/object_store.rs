//! Object storage interface (S3 compatible, local filesystem, in-memory).

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{
    aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory, path::Path, ObjectStore,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument};

use forecast_common::{BucketUri, ForecastError, ForecastResult};

/// Configuration for an S3-compatible object storage connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// S3/MinIO endpoint URL
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://minio:9000".to_string(),
            bucket: "meteoblue-hub".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            allow_http: true,
        }
    }
}

impl ObjectStorageConfig {
    /// Same connection, different bucket.
    pub fn with_bucket(&self, bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            ..self.clone()
        }
    }
}

/// Object storage client.
///
/// Every object is addressable both by its path inside the store and by a
/// URI (`s3://bucket/path`, `file:///root/path`, `memory://store/path`).
#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    base_uri: String,
}

impl std::fmt::Debug for ObjectStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStorage")
            .field("base_uri", &self.base_uri)
            .finish()
    }
}

impl ObjectStorage {
    /// Create an S3 client from config.
    pub fn new(config: &ObjectStorageConfig) -> ForecastResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region);

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| ForecastError::storage(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self {
            store: Arc::new(store),
            base_uri: format!("s3://{}", config.bucket),
        })
    }

    /// Store rooted at a local directory, created if missing.
    pub fn local(root: impl Into<PathBuf>) -> ForecastResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let store = LocalFileSystem::new_with_prefix(&root).map_err(|e| {
            ForecastError::storage(format!("Failed to open {}: {}", root.display(), e))
        })?;
        Ok(Self {
            store: Arc::new(store),
            base_uri: format!("file://{}", root.display()),
        })
    }

    /// Process-local store, mainly for tests.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            base_uri: "memory://store".to_string(),
        }
    }

    /// Wrap an existing store.
    pub fn from_store(store: Arc<dyn ObjectStore>, base_uri: impl Into<String>) -> Self {
        Self {
            store,
            base_uri: base_uri.into(),
        }
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// URI of an object path.
    pub fn uri_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_uri, path.trim_start_matches('/'))
    }

    /// Object path from a URI of this store, or from a plain path.
    pub fn path_for(&self, uri_or_path: &str) -> String {
        let prefix = format!("{}/", self.base_uri);
        uri_or_path
            .strip_prefix(&prefix)
            .unwrap_or(uri_or_path)
            .trim_start_matches('/')
            .to_string()
    }

    /// Write bytes to a path, returning the object URI.
    ///
    /// A put replaces the object in a single step, so readers see either the
    /// previous or the new content.
    #[instrument(skip(self, data), fields(store = %self.base_uri, path = %path))]
    pub async fn put(&self, path: &str, data: Bytes) -> ForecastResult<String> {
        let path = self.path_for(path);
        let location = Path::from(path.as_str());
        debug!(size = data.len(), "Writing object");

        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| ForecastError::storage(format!("Failed to write {}: {}", path, e)))?;

        Ok(self.uri_for(&path))
    }

    /// Read bytes from a path or URI.
    #[instrument(skip(self), fields(store = %self.base_uri))]
    pub async fn get(&self, uri_or_path: &str) -> ForecastResult<Bytes> {
        let path = self.path_for(uri_or_path);
        let location = Path::from(path.as_str());

        let result = self.store.get(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => ForecastError::DatasetNotFound(path.clone()),
            e => ForecastError::storage(format!("Failed to read {}: {}", path, e)),
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| ForecastError::storage(format!("Failed to read bytes: {}", e)))?;

        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }

    /// Check if an object exists.
    pub async fn exists(&self, uri_or_path: &str) -> ForecastResult<bool> {
        let path = self.path_for(uri_or_path);
        let location = Path::from(path.as_str());

        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(ForecastError::storage(format!(
                "Failed to check {}: {}",
                path, e
            ))),
        }
    }

    /// List object paths under a prefix, sorted.
    pub async fn list(&self, prefix: &str) -> ForecastResult<Vec<String>> {
        use futures::TryStreamExt;

        let prefix_path = Path::from(self.path_for(prefix).as_str());
        let mut paths = Vec::new();

        let mut stream = self.store.list(Some(&prefix_path));
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| ForecastError::storage(format!("List failed: {}", e)))?
        {
            paths.push(meta.location.to_string());
        }

        paths.sort();
        Ok(paths)
    }

    /// Delete an object.
    #[instrument(skip(self), fields(store = %self.base_uri))]
    pub async fn delete(&self, uri_or_path: &str) -> ForecastResult<()> {
        let path = self.path_for(uri_or_path);
        let location = Path::from(path.as_str());

        self.store
            .delete(&location)
            .await
            .map_err(|e| ForecastError::storage(format!("Failed to delete {}: {}", path, e)))?;

        Ok(())
    }
}

/// Uploads finished artifacts to a destination bucket.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Upload `data` as `file_name` under the destination prefix and return
    /// the object URI.
    async fn publish(
        &self,
        destination: &BucketUri,
        file_name: &str,
        data: Bytes,
    ) -> ForecastResult<String>;
}

/// Publishes to S3 buckets, connecting to whichever bucket the destination
/// names.
#[derive(Debug, Clone)]
pub struct S3Publisher {
    config: ObjectStorageConfig,
}

impl S3Publisher {
    pub fn new(config: ObjectStorageConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ArtifactPublisher for S3Publisher {
    async fn publish(
        &self,
        destination: &BucketUri,
        file_name: &str,
        data: Bytes,
    ) -> ForecastResult<String> {
        let storage = ObjectStorage::new(&self.config.with_bucket(&destination.bucket))?;
        storage.put(&destination.key_for(file_name), data).await
    }
}

/// Publishes into a single store regardless of the bucket name, keeping the
/// destination prefix. Used for local and in-memory deployments.
#[async_trait]
impl ArtifactPublisher for ObjectStorage {
    async fn publish(
        &self,
        destination: &BucketUri,
        file_name: &str,
        data: Bytes,
    ) -> ForecastResult<String> {
        self.put(&destination.key_for(file_name), data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_and_path_mapping() {
        let storage = ObjectStorage::in_memory();
        assert_eq!(storage.uri_for("a/b.json"), "memory://store/a/b.json");
        assert_eq!(storage.path_for("memory://store/a/b.json"), "a/b.json");
        assert_eq!(storage.path_for("/a/b.json"), "a/b.json");
        assert_eq!(storage.path_for("a/b.json"), "a/b.json");
    }

    #[test]
    fn test_config_with_bucket() {
        let config = ObjectStorageConfig::default().with_bucket("artifacts");
        assert_eq!(config.bucket, "artifacts");
        assert_eq!(config.region, "us-east-1");
    }

    #[test]
    fn test_s3_client_builds_without_network() {
        let storage = ObjectStorage::new(&ObjectStorageConfig::default()).unwrap();
        assert_eq!(storage.base_uri(), "s3://meteoblue-hub");
    }

    #[tokio::test]
    async fn test_put_get_exists_delete() {
        let storage = ObjectStorage::in_memory();
        let uri = storage
            .put("datasets/x.json", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        assert_eq!(uri, "memory://store/datasets/x.json");

        assert!(storage.exists(&uri).await.unwrap());
        assert_eq!(storage.get(&uri).await.unwrap(), Bytes::from_static(b"{}"));

        storage.delete("datasets/x.json").await.unwrap();
        assert!(!storage.exists("datasets/x.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let storage = ObjectStorage::in_memory();
        assert!(matches!(
            storage.get("nope.json").await,
            Err(ForecastError::DatasetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_scoped() {
        let storage = ObjectStorage::in_memory();
        for path in ["d/b/2.json", "d/a/1.json", "other/3.json", "d/b/1.json"] {
            storage.put(path, Bytes::from_static(b"x")).await.unwrap();
        }
        let listed = storage.list("d").await.unwrap();
        assert_eq!(listed, vec!["d/a/1.json", "d/b/1.json", "d/b/2.json"]);
    }

    #[tokio::test]
    async fn test_local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ObjectStorage::local(dir.path().join("root")).unwrap();
        storage.put("a/b.bin", Bytes::from_static(b"abc")).await.unwrap();
        assert!(dir.path().join("root/a/b.bin").exists());
        assert_eq!(storage.get("a/b.bin").await.unwrap(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn test_publish_into_store_keeps_prefix() {
        let storage = ObjectStorage::in_memory();
        let dest = BucketUri::parse("s3://artifacts/runs/today").unwrap();
        let uri = storage
            .publish(&dest, "file.tif", Bytes::from_static(b"tif"))
            .await
            .unwrap();
        assert_eq!(uri, "memory://store/runs/today/file.tif");
    }
}
