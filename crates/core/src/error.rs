//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("file {name} is {size} bytes, exceeding the {limit} byte limit")]
    TooLarge { name: String, size: u64, limit: u64 },

    #[error("file {name} is empty")]
    Empty { name: String },

    #[error("unsupported file type for {name}: only PDF and Word documents are accepted")]
    UnsupportedType { name: String },

    #[error("{name} is not a {expected}")]
    WrongType { name: String, expected: &'static str },
}

impl Error {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::TooLarge { .. } => "file_too_large",
            Error::Empty { .. } => "empty_file",
            Error::UnsupportedType { .. } | Error::WrongType { .. } => "unsupported_type",
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
