//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// One stored document attached to a parent case or task record.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct FileRecordRow {
    pub id: Uuid,
    pub parent_reference: String,
    pub display_name: String,
    pub url: String,
    pub storage_key: String,
    pub size: i64,
    pub mime_type: String,
    pub creator_id: String,
    pub created_at: OffsetDateTime,
}
