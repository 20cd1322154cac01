//! API error types.

use crate::convert::ConvertError;
use crate::runner::RunError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    /// Human-readable error message.
    pub error: String,
    /// Error code for programmatic handling.
    pub code: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] docket_core::Error),

    #[error("missing multipart field `file`")]
    MissingFile,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conversion tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("conversion failed: {0}")]
    ToolExecutionFailed(String),

    #[error("conversion timed out: {0}")]
    ToolTimeout(String),

    #[error("{0}")]
    OutputIntegrity(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.code(),
            Self::MissingFile => "missing_file",
            Self::BadRequest(_) => "bad_request",
            Self::ToolUnavailable(_) => "tool_unavailable",
            Self::ToolExecutionFailed(_) => "tool_execution_failed",
            Self::ToolTimeout(_) => "tool_timeout",
            Self::OutputIntegrity(_) => "output_integrity",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::MissingFile | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::ToolUnavailable(_)
            | Self::ToolExecutionFailed(_)
            | Self::ToolTimeout(_)
            | Self::OutputIntegrity(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ConvertError> for ApiError {
    fn from(err: ConvertError) -> Self {
        match err {
            ConvertError::Tool(run) => match run {
                RunError::Unavailable { .. } => Self::ToolUnavailable(run.to_string()),
                RunError::ExecutionFailed { .. } => Self::ToolExecutionFailed(run.to_string()),
                RunError::Timeout { .. } => Self::ToolTimeout(run.to_string()),
            },
            ConvertError::OutputIntegrity(message) => Self::OutputIntegrity(message),
            ConvertError::Staging(e) => Self::Internal(format!("staging failed: {e}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
