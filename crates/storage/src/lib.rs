//! Object storage abstraction and backends for docket.
//!
//! This crate provides:
//! - Upsert-style document storage keyed by sanitized paths
//! - Public URL resolution for stored documents
//! - Bucket listing and creation for self-provisioning
//! - Backends: local filesystem and S3-compatible

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend, s3::S3Settings};
pub use error::{StorageError, StorageResult};
pub use traits::{BucketAdmin, BucketCreation, ObjectMeta, ObjectStore};

use docket_core::config::StorageConfig;
use std::sync::Arc;

/// Both views of one configured backend.
#[derive(Clone)]
pub struct Storage {
    pub objects: Arc<dyn ObjectStore>,
    pub buckets: Arc<dyn BucketAdmin>,
}

impl Storage {
    pub fn new<B: ObjectStore + BucketAdmin>(backend: B) -> Self {
        let backend = Arc::new(backend);
        Self {
            objects: backend.clone(),
            buckets: backend,
        }
    }
}

/// Create a storage backend from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Storage> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem {
            path,
            bucket,
            public_base_url,
        } => {
            let backend =
                FilesystemBackend::new(path, bucket.clone(), public_base_url.clone()).await?;
            Ok(Storage::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
            public_base_url,
        } => {
            let backend = S3Backend::new(S3Settings {
                bucket: bucket.clone(),
                endpoint: endpoint.clone(),
                region: region.clone(),
                prefix: prefix.clone(),
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                force_path_style: *force_path_style,
                public_base_url: public_base_url.clone(),
            })
            .await?;
            Ok(Storage::new(backend))
        }
    }
}
