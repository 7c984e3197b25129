//! Storage abstractions for the forecast hub.
//!
//! Provides unified interfaces for:
//! - Object storage (S3/MinIO, local filesystem, in-memory)
//! - Canonical dataset persistence keyed by (service, location, run)
//! - Publication of raster artifacts to destination buckets

pub mod dataset_store;
pub mod object_store;

pub use self::object_store::{ArtifactPublisher, ObjectStorage, ObjectStorageConfig, S3Publisher};
pub use dataset_store::{DatasetKey, DatasetStore};
