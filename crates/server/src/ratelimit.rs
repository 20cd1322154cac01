//! Admission control using fixed-window counters.
//!
//! Two independent limiters keyed by client address:
//! - conversion endpoints (default 50 requests per 15 minutes)
//! - health endpoint (default 30 requests per minute)
//!
//! Windows are fixed, not sliding: a client may spend a full quota at the end
//! of one window and another at the start of the next.
//!
//! # Memory Safety
//!
//! Each limiter tracks at most `max_entries` client keys. New keys beyond
//! that are rejected until the background cleanup drops elapsed windows.
//!
//! # Security Note
//!
//! X-Forwarded-For and X-Real-IP are only honoured when the connection comes
//! from a configured trusted proxy:
//!
//! - Empty list (default): Only direct connection IP is used (most secure)
//! - List of IPs/CIDRs: Headers trusted only when request comes from these IPs
//! - ["*"]: Trust headers from all sources (NOT recommended for production)

use crate::metrics::RATE_LIMITED_TOTAL;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::{DashMap, mapref::entry::Entry};
use docket_core::config::RateLimitConfig;
use ipnet::IpNet;
use std::{
    net::{IpAddr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

/// Time source for window arithmetic.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset_millis: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_millis: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_millis.load(Ordering::SeqCst))
    }
}

/// Which limiter a request is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    Conversion,
    Health,
}

impl RateLimitScope {
    fn as_str(self) -> &'static str {
        match self {
            RateLimitScope::Conversion => "conversion",
            RateLimitScope::Health => "health",
        }
    }
}

/// Counter for one client key within its current window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitWindow {
    pub window_start: Instant,
    pub count: u32,
}

/// A keyed fixed-window counter.
///
/// Check-and-increment happens under the DashMap shard lock for the key, so
/// concurrent requests from one client can never exceed `limit` per window.
pub struct FixedWindowLimiter {
    scope: RateLimitScope,
    limit: u32,
    window: Duration,
    windows: DashMap<String, RateLimitWindow>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    at_capacity_warned: AtomicBool,
}

impl FixedWindowLimiter {
    pub fn new(
        scope: RateLimitScope,
        limit: u32,
        window: Duration,
        max_entries: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scope,
            limit,
            window,
            windows: DashMap::new(),
            max_entries,
            clock,
            at_capacity_warned: AtomicBool::new(false),
        }
    }

    /// Admit or reject one request from `key`.
    pub fn check(&self, key: &str) -> Result<(), RateLimitError> {
        let now = self.clock.now();

        // len() must not run while holding an entry guard.
        let current_len = self.windows.len();
        let at_capacity = current_len >= self.max_entries;

        match self.windows.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let window = entry.get_mut();
                let elapsed = now.saturating_duration_since(window.window_start);
                if elapsed >= self.window {
                    window.window_start = now;
                    window.count = 0;
                }
                if window.count >= self.limit {
                    let remaining = self
                        .window
                        .saturating_sub(now.saturating_duration_since(window.window_start));
                    return Err(self.rejected(retry_after_secs(remaining)));
                }
                window.count += 1;
                Ok(())
            }
            Entry::Vacant(entry) => {
                if at_capacity {
                    self.warn_at_capacity(current_len);
                    return Err(RateLimitError {
                        scope: self.scope,
                        retry_after_secs: 60,
                        reason: RateLimitReason::AtCapacity,
                    });
                }
                if self.limit == 0 {
                    return Err(self.rejected(retry_after_secs(self.window)));
                }
                entry.insert(RateLimitWindow {
                    window_start: now,
                    count: 1,
                });
                Ok(())
            }
        }
    }

    fn rejected(&self, retry_after_secs: u64) -> RateLimitError {
        RateLimitError {
            scope: self.scope,
            retry_after_secs,
            reason: RateLimitReason::RateLimited,
        }
    }

    /// Drop windows that have fully elapsed. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let window = self.window;
        let expired: Vec<String> = self
            .windows
            .iter()
            .filter(|entry| now.saturating_duration_since(entry.value().window_start) >= window)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for key in expired {
            // Re-check under the lock; a request may have opened a new window meanwhile.
            if self
                .windows
                .remove_if(&key, |_, w| {
                    now.saturating_duration_since(w.window_start) >= window
                })
                .is_some()
            {
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.at_capacity_warned.store(false, Ordering::Relaxed);
        }
        evicted
    }

    pub fn entry_count(&self) -> usize {
        self.windows.len()
    }

    /// Snapshot of the window for one key.
    pub fn window(&self, key: &str) -> Option<RateLimitWindow> {
        self.windows.get(key).map(|w| *w)
    }

    fn warn_at_capacity(&self, current_entries: usize) {
        if !self.at_capacity_warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                current_entries,
                max_entries = self.max_entries,
                scope = self.scope.as_str(),
                "Rate limiter at capacity, rejecting new client keys"
            );
        }
    }
}

fn retry_after_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}

/// Rate limiter state shared across requests.
#[derive(Clone)]
pub struct RateLimitState {
    inner: Option<Arc<RateLimitStateInner>>,
}

struct RateLimitStateInner {
    conversion: FixedWindowLimiter,
    health: FixedWindowLimiter,
    trusted_proxies: TrustedProxies,
    connect_info_warned: AtomicBool,
}

/// A parsed trusted proxy entry (either an IP or CIDR range).
#[derive(Clone, Debug)]
enum TrustedEntry {
    Ip(IpAddr),
    Cidr(IpNet),
}

/// Trusted proxy configuration for IP extraction.
#[derive(Clone, Debug)]
enum TrustedProxies {
    None,
    All,
    List(Vec<TrustedEntry>),
}

impl TrustedProxies {
    fn from_config(proxies: &[String]) -> Self {
        if proxies.is_empty() {
            return Self::None;
        }
        if proxies.len() == 1 && proxies[0] == "*" {
            return Self::All;
        }

        let entries = proxies
            .iter()
            .filter_map(|p| {
                let parsed = if p.contains('/') {
                    p.parse::<IpNet>().map(TrustedEntry::Cidr).map_err(|e| e.to_string())
                } else {
                    p.parse::<IpAddr>().map(TrustedEntry::Ip).map_err(|e| e.to_string())
                };
                parsed
                    .inspect_err(|e| tracing::warn!(entry = %p, error = %e, "Ignoring invalid trusted proxy"))
                    .ok()
            })
            .collect();
        Self::List(entries)
    }

    fn is_trusted(&self, connection_ip: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::List(entries) => {
                let Ok(ip) = connection_ip.parse::<IpAddr>() else {
                    return false;
                };
                entries.iter().any(|entry| match entry {
                    TrustedEntry::Ip(trusted) => *trusted == ip,
                    TrustedEntry::Cidr(network) => network.contains(&ip),
                })
            }
        }
    }
}

impl RateLimitState {
    /// Create rate limit state from configuration using the system clock.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create rate limit state with an explicit clock.
    pub fn with_clock(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        if !config.enabled {
            return Self { inner: None };
        }

        let max_entries = config.max_entries as usize;
        Self {
            inner: Some(Arc::new(RateLimitStateInner {
                conversion: FixedWindowLimiter::new(
                    RateLimitScope::Conversion,
                    config.conversion_requests,
                    config.conversion_window(),
                    max_entries,
                    clock.clone(),
                ),
                health: FixedWindowLimiter::new(
                    RateLimitScope::Health,
                    config.health_requests,
                    config.health_window(),
                    max_entries,
                    clock,
                ),
                trusted_proxies: TrustedProxies::from_config(&config.trusted_proxies),
                connect_info_warned: AtomicBool::new(false),
            })),
        }
    }

    /// Disabled state that admits everything.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Admit or reject one request from `client` against `scope`.
    pub fn check(&self, scope: RateLimitScope, client: &str) -> Result<(), RateLimitError> {
        match &self.inner {
            Some(inner) => inner.limiter(scope).check(client),
            None => Ok(()),
        }
    }

    /// Clean up elapsed windows in both limiters.
    pub fn cleanup(&self) -> usize {
        match &self.inner {
            Some(inner) => inner.conversion.cleanup() + inner.health.cleanup(),
            None => 0,
        }
    }

    /// Tracked keys as (conversion, health).
    pub fn entry_count(&self) -> (usize, usize) {
        match &self.inner {
            Some(inner) => (inner.conversion.entry_count(), inner.health.entry_count()),
            None => (0, 0),
        }
    }

    fn warn_connect_info_missing(&self) {
        if let Some(inner) = &self.inner
            && !inner.connect_info_warned.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                "ConnectInfo not available for rate limiting. All requests share the \
                 'unknown' client key. Serve with into_make_service_with_connect_info::<SocketAddr>()."
            );
        }
    }
}

impl RateLimitStateInner {
    fn limiter(&self, scope: RateLimitScope) -> &FixedWindowLimiter {
        match scope {
            RateLimitScope::Conversion => &self.conversion,
            RateLimitScope::Health => &self.health,
        }
    }
}

/// Reason for rate limit rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReason {
    /// Quota for the current window is spent.
    RateLimited,
    /// Limiter cannot track another client key.
    AtCapacity,
}

/// Error returned when a request is not admitted.
#[derive(Debug)]
pub struct RateLimitError {
    pub scope: RateLimitScope,
    /// Number of seconds to wait before retrying.
    pub retry_after_secs: u64,
    pub reason: RateLimitReason,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        RATE_LIMITED_TOTAL
            .with_label_values(&[self.scope.as_str()])
            .inc();

        let message = match self.reason {
            RateLimitReason::RateLimited => format!(
                "Too many {} requests. Retry after {} seconds.",
                self.scope.as_str(),
                self.retry_after_secs
            ),
            RateLimitReason::AtCapacity => {
                "Server is experiencing high load. Please retry later.".to_string()
            }
        };

        let body = serde_json::json!({
            "success": false,
            "error": message,
            "code": "rate_limited",
            "retry_after": self.retry_after_secs,
        });

        (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", self.retry_after_secs.to_string())],
            axum::Json(body),
        )
            .into_response()
    }
}

fn extract_forwarded_ip(req: &Request<Body>) -> Option<String> {
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(s) = forwarded.to_str()
        && let Some(ip) = s.split(',').next()
    {
        return Some(ip.trim().to_string());
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(s) = real_ip.to_str()
    {
        return Some(s.trim().to_string());
    }

    None
}

fn extract_connection_ip(req: &Request<Body>) -> Option<String> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

/// Client key for a request, honouring forwarded headers only from trusted proxies.
fn extract_ip(req: &Request<Body>, state: &RateLimitState) -> String {
    let Some(inner) = &state.inner else {
        return "unknown".to_string();
    };

    let connection_ip = extract_connection_ip(req);
    let trust_headers = match (&connection_ip, &inner.trusted_proxies) {
        (None, TrustedProxies::All) => true,
        (None, _) => false,
        (Some(conn_ip), trusted_proxies) => trusted_proxies.is_trusted(conn_ip),
    };

    if trust_headers && let Some(forwarded_ip) = extract_forwarded_ip(req) {
        return forwarded_ip;
    }

    match connection_ip {
        Some(ip) => ip,
        None => {
            state.warn_connect_info_missing();
            "unknown".to_string()
        }
    }
}

async fn enforce(
    scope: RateLimitScope,
    rate_limit: RateLimitState,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !rate_limit.is_enabled() {
        return next.run(req).await;
    }

    let client = extract_ip(&req, &rate_limit);
    match rate_limit.check(scope, &client) {
        Ok(()) => next.run(req).await,
        Err(e) => {
            tracing::info!(client = %client, scope = scope.as_str(), "Request rejected by rate limiter");
            e.into_response()
        }
    }
}

/// Admission control for the conversion endpoints. Runs before the handler
/// reads the body, so rejected requests never reach a subprocess.
pub async fn conversion_rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    enforce(RateLimitScope::Conversion, rate_limit, req, next).await
}

/// Admission control for the health endpoint.
pub async fn health_rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    enforce(RateLimitScope::Health, rate_limit, req, next).await
}

/// Spawn a background task that periodically drops elapsed windows.
pub fn spawn_cleanup_task(
    state: RateLimitState,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let evicted = state.cleanup();
            if evicted > 0 {
                tracing::debug!(evicted, "Rate limiter cleanup evicted elapsed windows");
            }
        }
    })
}
