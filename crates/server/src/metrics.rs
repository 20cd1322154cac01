//! Prometheus metrics for the conversion service.
//!
//! The `/metrics` endpoint is unauthenticated so Prometheus can scrape it.
//! Restrict it to the scraper at the network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static CONVERSIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "docket_conversions_total",
            "Conversion jobs by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("metric creation failed")
});

pub static CONVERSION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "docket_conversion_duration_seconds",
            "Wall time of a conversion job including staging and cleanup",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["operation"],
    )
    .expect("metric creation failed")
});

pub static RATE_LIMITED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "docket_rate_limited_total",
            "Requests rejected by admission control",
        ),
        &["scope"],
    )
    .expect("metric creation failed")
});

pub static STAGING_FILES_REMOVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "docket_staging_files_removed_total",
        "Stale staging entries removed by the janitor",
    )
    .expect("metric creation failed")
});

pub static CLEANUP_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "docket_cleanup_failures_total",
        "Staged files that could not be removed after a request",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(CONVERSIONS_TOTAL.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CONVERSION_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RATE_LIMITED_TOTAL.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(STAGING_FILES_REMOVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CLEANUP_FAILURES.clone()))
            .expect("metric registration failed");
    });
}

/// Prometheus scrape handler.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

pub fn record_conversion(operation: &str, outcome: &str, seconds: f64) {
    CONVERSIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
    CONVERSION_DURATION
        .with_label_values(&[operation])
        .observe(seconds);
}
