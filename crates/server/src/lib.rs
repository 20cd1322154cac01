//! HTTP conversion service for case documents.
//!
//! - PDF normalization through Ghostscript
//! - Word-to-PDF conversion through headless LibreOffice
//! - Tool health reporting
//! - Fixed-window admission control per client address
//! - Background cleanup of the staging directory

pub mod convert;
pub mod error;
pub mod handlers;
pub mod janitor;
pub mod metrics;
pub mod ratelimit;
pub mod routes;
pub mod runner;
pub mod state;

pub use convert::{Converter, HealthReport, HealthStatus};
pub use error::ApiError;
pub use ratelimit::RateLimitState;
pub use routes::create_router;
pub use runner::{SubprocessRunner, ToolRunner};
pub use state::AppState;
