//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Conversion service HTTP configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3001").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Largest accepted upload in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Directory where conversion jobs stage their input and output files.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: restrict this endpoint to the scraper at the network level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}

fn default_max_upload_bytes() -> u64 {
    crate::MAX_DOCUMENT_BYTES
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("docket-staging")
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
            staging_dir: default_staging_dir(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// External converter binaries and their limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Ghostscript executable used for PDF normalization.
    #[serde(default = "default_ghostscript_path")]
    pub ghostscript_path: PathBuf,
    /// LibreOffice executable used for word-processor conversion.
    #[serde(default = "default_libreoffice_path")]
    pub libreoffice_path: PathBuf,
    /// Deadline for each `--version` health probe.
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
    /// Optional deadline for conversion runs. Unset means the request
    /// deadline of the caller is the only bound.
    #[serde(default)]
    pub conversion_timeout_secs: Option<u64>,
    /// Outputs smaller than this are treated as truncated.
    #[serde(default = "default_min_output_bytes")]
    pub min_output_bytes: u64,
}

fn default_ghostscript_path() -> PathBuf {
    PathBuf::from("gs")
}

fn default_libreoffice_path() -> PathBuf {
    PathBuf::from("soffice")
}

fn default_health_timeout_secs() -> u64 {
    3
}

fn default_min_output_bytes() -> u64 {
    100
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ghostscript_path: default_ghostscript_path(),
            libreoffice_path: default_libreoffice_path(),
            health_timeout_secs: default_health_timeout_secs(),
            conversion_timeout_secs: None,
            min_output_bytes: default_min_output_bytes(),
        }
    }
}

impl ToolsConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn conversion_timeout(&self) -> Option<Duration> {
        self.conversion_timeout_secs.map(Duration::from_secs)
    }
}

/// Rate limiting configuration.
///
/// Two fixed windows keyed by client address: one shared by the conversion
/// endpoints and one for the health endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Conversion requests admitted per client per window.
    #[serde(default = "default_conversion_requests")]
    pub conversion_requests: u32,
    /// Length of the conversion window in seconds.
    #[serde(default = "default_conversion_window_secs")]
    pub conversion_window_secs: u64,
    /// Health requests admitted per client per window.
    #[serde(default = "default_health_requests")]
    pub health_requests: u32,
    /// Length of the health window in seconds.
    #[serde(default = "default_health_window_secs")]
    pub health_window_secs: u64,
    /// Trusted proxy IP addresses/CIDR ranges.
    /// Only requests from these IPs will have X-Forwarded-For/X-Real-IP headers trusted.
    /// If empty, forwarded headers are never trusted (only direct connection IP is used).
    /// Use ["*"] to trust all proxies (NOT recommended for production).
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// Maximum number of client keys tracked per limiter before new keys are rejected.
    #[serde(default = "default_max_entries")]
    pub max_entries: u32,
    /// Interval in seconds between sweeps of elapsed windows (default: 60).
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_conversion_requests() -> u32 {
    50
}

fn default_conversion_window_secs() -> u64 {
    15 * 60
}

fn default_health_requests() -> u32 {
    30
}

fn default_health_window_secs() -> u64 {
    60
}

fn default_max_entries() -> u32 {
    100_000
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            conversion_requests: default_conversion_requests(),
            conversion_window_secs: default_conversion_window_secs(),
            health_requests: default_health_requests(),
            health_window_secs: default_health_window_secs(),
            trusted_proxies: Vec::new(),
            max_entries: default_max_entries(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn conversion_window(&self) -> Duration {
        Duration::from_secs(self.conversion_window_secs)
    }

    pub fn health_window(&self) -> Duration {
        Duration::from_secs(self.health_window_secs)
    }

    /// Validate rate limit configuration.
    /// Returns warnings for settings that are insecure but allowed,
    /// and an error for settings that cannot work.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if !self.enabled {
            return Ok(warnings);
        }

        if self.cleanup_interval_secs == 0 {
            return Err("rate_limit.cleanup_interval_secs cannot be 0".to_string());
        }

        if self.conversion_window_secs == 0 || self.health_window_secs == 0 {
            return Err("rate_limit window lengths must be at least 1 second".to_string());
        }

        if self.trusted_proxies.len() == 1 && self.trusted_proxies[0] == "*" {
            warnings.push(
                "rate_limit.trusted_proxies=['*'] trusts ALL forwarded headers. \
                 Clients can spoof their address and bypass rate limits."
                    .to_string(),
            );
        }

        Ok(warnings)
    }
}

/// Staging directory janitor configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JanitorConfig {
    #[serde(default = "default_janitor_enabled")]
    pub enabled: bool,
    /// Seconds between sweeps.
    #[serde(default = "default_janitor_interval_secs")]
    pub interval_secs: u64,
    /// Entries whose mtime is older than this are removed.
    #[serde(default = "default_janitor_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_janitor_enabled() -> bool {
    true
}

fn default_janitor_interval_secs() -> u64 {
    3600
}

fn default_janitor_max_age_secs() -> u64 {
    3600
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_janitor_enabled(),
            interval_secs: default_janitor_interval_secs(),
            max_age_secs: default_janitor_max_age_secs(),
        }
    }
}

impl JanitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// Complete conversion service configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub janitor: JanitorConfig,
}

impl ServiceConfig {
    /// Create a test configuration staging into `staging_dir`.
    ///
    /// **For testing only.** Rate limiting stays on with the production
    /// quotas; the janitor is disabled.
    pub fn for_testing(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig {
                staging_dir: staging_dir.into(),
                ..ServerConfig::default()
            },
            janitor: JanitorConfig {
                enabled: false,
                ..JanitorConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<Vec<String>, String> {
        if self.janitor.enabled && self.janitor.interval_secs == 0 {
            return Err("janitor.interval_secs cannot be 0".to_string());
        }
        if self.server.max_upload_bytes == 0 {
            return Err("server.max_upload_bytes cannot be 0".to_string());
        }
        self.rate_limit.validate()
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage. Each bucket is a directory under `path`.
    Filesystem {
        /// Root directory holding bucket directories.
        path: PathBuf,
        /// Bucket (directory) name.
        #[serde(default = "default_bucket")]
        bucket: String,
        /// Base URL the bucket is published under. Falls back to `file://` URLs.
        public_base_url: Option<String>,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the ambient credential chain if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
        /// Base URL for public object links, when served through a CDN or proxy.
        public_base_url: Option<String>,
    },
}

fn default_bucket() -> String {
    "case-documents".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
            bucket: default_bucket(),
            public_base_url: None,
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            StorageConfig::Filesystem { bucket, .. } => {
                if bucket.is_empty() || bucket.contains('/') || bucket == ".." {
                    Err(format!("invalid filesystem bucket name: {bucket:?}"))
                } else {
                    Ok(())
                }
            }
        }
    }

    pub fn bucket(&self) -> &str {
        match self {
            StorageConfig::Filesystem { bucket, .. } | StorageConfig::S3 { bucket, .. } => bucket,
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only, slow queries are logged).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

/// Upload orchestrator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Top-level key namespace for stored documents.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Largest file accepted by the orchestrator.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Base URL of the conversion service. Without it, documents are stored
    /// as submitted.
    #[serde(default)]
    pub conversion_url: Option<String>,
    /// Run PDFs through the normalization endpoint before upload.
    #[serde(default = "default_optimize_pdfs")]
    pub optimize_pdfs: bool,
    /// Timeout for calls to the conversion service.
    #[serde(default = "default_conversion_request_timeout_secs")]
    pub conversion_request_timeout_secs: u64,
    /// How long provisioning waits for a new bucket to become visible.
    #[serde(default = "default_provision_timeout_secs")]
    pub provision_timeout_secs: u64,
    /// First delay between bucket existence polls; doubles on each attempt.
    #[serde(default = "default_provision_poll_ms")]
    pub provision_poll_ms: u64,
    /// Blobs younger than this are never treated as orphans.
    #[serde(default = "default_orphan_grace_secs")]
    pub orphan_grace_secs: u64,
}

fn default_namespace() -> String {
    "case-files".to_string()
}

fn default_max_file_bytes() -> u64 {
    crate::MAX_DOCUMENT_BYTES
}

fn default_optimize_pdfs() -> bool {
    true
}

fn default_conversion_request_timeout_secs() -> u64 {
    120
}

fn default_provision_timeout_secs() -> u64 {
    10
}

fn default_provision_poll_ms() -> u64 {
    200
}

fn default_orphan_grace_secs() -> u64 {
    3600
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            max_file_bytes: default_max_file_bytes(),
            conversion_url: None,
            optimize_pdfs: default_optimize_pdfs(),
            conversion_request_timeout_secs: default_conversion_request_timeout_secs(),
            provision_timeout_secs: default_provision_timeout_secs(),
            provision_poll_ms: default_provision_poll_ms(),
            orphan_grace_secs: default_orphan_grace_secs(),
        }
    }
}

impl IngestConfig {
    pub fn provision_timeout(&self) -> Duration {
        Duration::from_secs(self.provision_timeout_secs)
    }

    pub fn provision_poll_interval(&self) -> Duration {
        Duration::from_millis(self.provision_poll_ms)
    }

    pub fn conversion_request_timeout(&self) -> Duration {
        Duration::from_secs(self.conversion_request_timeout_secs)
    }

    pub fn orphan_grace(&self) -> time::Duration {
        let secs = i64::try_from(self.orphan_grace_secs).unwrap_or(i64::MAX);
        time::Duration::seconds(secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.namespace.trim_matches('/').is_empty() {
            return Err("ingest.namespace cannot be empty".to_string());
        }
        if self.max_file_bytes == 0 {
            return Err("ingest.max_file_bytes cannot be 0".to_string());
        }
        if self.provision_poll_ms == 0 {
            return Err("ingest.provision_poll_ms cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Complete upload client configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.ingest.validate()?;
        self.storage.validate()
    }
}
