//! Docket conversion service binary.

use anyhow::{Context, Result};
use clap::Parser;
use docket_core::config::ServiceConfig;
use docket_server::{AppState, create_router};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Docket - PDF normalization and conversion service
#[derive(Parser, Debug)]
#[command(name = "docket-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "DOCKET_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

fn load_config(path: &str) -> Result<ServiceConfig> {
    let mut figment = Figment::new();
    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "No config file found, using defaults and environment");
    }

    figment
        .merge(Env::prefixed("DOCKET_").split("__"))
        .extract()
        .context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Docket conversion service v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    docket_server::metrics::register_metrics();

    let state = AppState::new(config.clone())
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    state
        .converter
        .ensure_staging_dir()
        .await
        .with_context(|| {
            format!(
                "failed to create staging directory {}",
                config.server.staging_dir.display()
            )
        })?;

    let health = state.converter.health().await;
    tracing::info!(
        status = ?health.status,
        ghostscript = ?health.ghostscript_version,
        libreoffice = ?health.libreoffice_version,
        "Tool availability at startup"
    );

    if let Some(cleanup_interval) = state.rate_limit_cleanup_interval() {
        docket_server::ratelimit::spawn_cleanup_task(state.rate_limit.clone(), cleanup_interval);
        tracing::info!(
            interval_secs = cleanup_interval.as_secs(),
            "Rate limiter cleanup task spawned"
        );
    }

    if let Some((janitor, interval)) = state.janitor() {
        janitor.spawn(interval);
        tracing::info!(
            interval_secs = interval.as_secs(),
            max_age_secs = config.janitor.max_age_secs,
            "Staging janitor spawned"
        );
    } else {
        tracing::info!("Staging janitor disabled");
    }

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    // ConnectInfo is required for per-client admission control.
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "0.0.0.0:9000"

[rate_limit]
conversion_requests = 5
"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.rate_limit.conversion_requests, 5);
        assert_eq!(config.rate_limit.health_requests, 30);
    }

    #[test]
    fn load_config_without_file_uses_defaults() {
        let config = load_config("/nonexistent/docket.toml").unwrap();
        assert_eq!(config.tools.min_output_bytes, 100);
    }
}
