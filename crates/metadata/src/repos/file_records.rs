//! File record repository.

use crate::error::MetadataResult;
use crate::models::FileRecordRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for stored document metadata.
#[async_trait]
pub trait FileRecordRepo: Send + Sync {
    /// Insert a record. Duplicate ids or storage keys fail with `AlreadyExists`.
    async fn insert_file_record(&self, record: &FileRecordRow) -> MetadataResult<()>;

    /// Get a record by id.
    async fn get_file_record(&self, id: Uuid) -> MetadataResult<Option<FileRecordRow>>;

    /// Records attached to a parent, oldest first.
    async fn list_file_records(&self, parent_reference: &str)
    -> MetadataResult<Vec<FileRecordRow>>;

    /// Whether any record points at the given storage key.
    async fn file_record_exists_for_key(&self, storage_key: &str) -> MetadataResult<bool>;

    /// Total number of records.
    async fn count_file_records(&self) -> MetadataResult<u64>;
}
