//! Application state shared across handlers.

use crate::convert::Converter;
use crate::janitor::Janitor;
use crate::ratelimit::RateLimitState;
use crate::runner::{SubprocessRunner, ToolRunner};
use docket_core::config::ServiceConfig;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Arc<ServiceConfig>,
    /// Runs conversion jobs.
    pub converter: Converter,
    /// Admission control.
    pub rate_limit: RateLimitState,
}

impl AppState {
    /// Create state that runs the real tools.
    pub fn new(config: ServiceConfig) -> Result<Self, String> {
        Self::with_runner(config, Arc::new(SubprocessRunner))
    }

    /// Create state with an explicit tool runner.
    ///
    /// Fails when the configuration is invalid. Warnings are logged.
    pub fn with_runner(config: ServiceConfig, runner: Arc<dyn ToolRunner>) -> Result<Self, String> {
        Self::with_parts(config, runner, None)
    }

    /// Create state with an explicit runner and rate limiter.
    pub fn with_parts(
        config: ServiceConfig,
        runner: Arc<dyn ToolRunner>,
        rate_limit: Option<RateLimitState>,
    ) -> Result<Self, String> {
        for warning in config.validate()? {
            tracing::warn!("Configuration warning: {}", warning);
        }

        let converter = Converter::new(
            runner,
            config.tools.clone(),
            config.server.staging_dir.clone(),
        );
        let rate_limit = rate_limit.unwrap_or_else(|| RateLimitState::new(&config.rate_limit));

        Ok(Self {
            config: Arc::new(config),
            converter,
            rate_limit,
        })
    }

    /// Get the cleanup interval for the rate limiter, if enabled.
    pub fn rate_limit_cleanup_interval(&self) -> Option<Duration> {
        self.rate_limit
            .is_enabled()
            .then(|| Duration::from_secs(self.config.rate_limit.cleanup_interval_secs))
    }

    /// The janitor for this service's staging directory, if enabled.
    pub fn janitor(&self) -> Option<(Janitor, Duration)> {
        let config = &self.config.janitor;
        config.enabled.then(|| {
            (
                Janitor::new(self.config.server.staging_dir.clone(), config.max_age()),
                config.interval(),
            )
        })
    }
}
