//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::ratelimit::{conversion_rate_limit_middleware, health_rate_limit_middleware};
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let rate_limit_state = state.rate_limit.clone();
    let body_limit =
        usize::try_from(state.config.server.max_upload_bytes).unwrap_or(usize::MAX);

    // route_layer keeps admission control off unmatched paths, and it runs
    // before the multipart body is read.
    let conversion_routes = Router::new()
        .route("/convert-word-to-pdf", post(handlers::convert_word_to_pdf))
        .route("/normalize-pdf", post(handlers::normalize_pdf))
        .route_layer(middleware::from_fn_with_state(
            rate_limit_state.clone(),
            conversion_rate_limit_middleware,
        ))
        .layer(DefaultBodyLimit::max(
            body_limit.saturating_add(MULTIPART_OVERHEAD),
        ));

    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route_layer(middleware::from_fn_with_state(
            rate_limit_state,
            health_rate_limit_middleware,
        ));

    let mut router = Router::new().merge(conversion_routes).merge(health_routes);

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to the Prometheus scraper.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
