//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

/// Object metadata.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time, when the backend reports one.
    pub last_modified: Option<OffsetDateTime>,
    /// Content type, when the backend stores one.
    pub content_type: Option<String>,
}

/// Key-addressed blob storage inside a single bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get object metadata.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get an object's full contents.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Store an object, replacing any existing object under the same key.
    ///
    /// Returns [`crate::StorageError::BucketMissing`] when the bucket is gone so
    /// callers can provision it and retry.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Delete an object.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List object keys with a given prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Public URL under which a stored object is served.
    fn public_url(&self, key: &str) -> String;

    /// Name of the bucket this store writes into.
    fn bucket(&self) -> &str;

    /// Get the backend name for logging/debugging.
    fn backend_name(&self) -> &'static str;

    /// Check backend connectivity.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Outcome of a bucket creation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketCreation {
    Created,
    AlreadyExists,
}

/// Privileged bucket operations used by self-provisioning.
#[async_trait]
pub trait BucketAdmin: Send + Sync + 'static {
    /// Names of all buckets visible to the configured credentials.
    async fn list_buckets(&self) -> StorageResult<Vec<String>>;

    /// Create a bucket. An existing bucket is reported, not treated as an error.
    async fn create_bucket(&self, name: &str) -> StorageResult<BucketCreation>;
}
