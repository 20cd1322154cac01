//! Upload pipeline error types.

use docket_metadata::MetadataError;
use docket_storage::StorageError;
use thiserror::Error;

/// Why a single file did not end up stored and recorded.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] docket_core::Error),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("upload of {key} failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: StorageError,
    },

    /// The blob is stored under `key` but has no record. The reconciliation
    /// sweep removes it once it is past the grace period.
    #[error("stored {key} but failed to record it: {source}")]
    MetadataPersist {
        key: String,
        #[source]
        source: MetadataError,
    },

    #[error("conversion service error: {0}")]
    Conversion(String),
}

impl IngestError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.code(),
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::Upload { .. } => "upload_failed",
            Self::MetadataPersist { .. } => "metadata_persist_failed",
            Self::Conversion(_) => "conversion_failed",
        }
    }

    /// Key of a blob left without a record, if this error produced one.
    pub fn orphaned_key(&self) -> Option<&str> {
        match self {
            Self::MetadataPersist { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Result type for ingest operations.
pub type IngestResult<T> = std::result::Result<T, IngestError>;
