//! Tool health endpoint.

use crate::convert::HealthReport;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;

/// GET /health
///
/// Always 200. A degraded service reports it through `status`, so a client
/// can tell "reachable but broken" apart from "unreachable".
pub async fn health_check(State(state): State<AppState>) -> Json<HealthReport> {
    let report = state.converter.health().await;
    if report.status != crate::convert::HealthStatus::Ok {
        tracing::warn!(
            ghostscript_error = ?report.ghostscript_error,
            libreoffice_error = ?report.libreoffice_error,
            "Health check reports degraded tools"
        );
    }
    Json(report)
}
