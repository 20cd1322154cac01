//! Core types shared by the docket conversion service and upload client.
//!
//! - Configuration for both binaries
//! - Document classification (PDF vs. word-processor document)
//! - Storage key construction and file name sanitization

pub mod config;
pub mod document;
pub mod error;
pub mod key;

pub use document::{DocumentKind, classify, validate_upload};
pub use error::{Error, Result};
pub use key::{StorageKey, sanitize_file_name};

/// Default ceiling for a single document: 50 MiB.
pub const MAX_DOCUMENT_BYTES: u64 = 50 * 1024 * 1024;

/// MIME type of every normalized artifact.
pub const PDF_MIME: &str = "application/pdf";
