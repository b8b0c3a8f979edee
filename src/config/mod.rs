use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Where snapshot artifacts are written.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactBackend {
    #[default]
    Local,
    R2,
}

/// Which rendering engine the capture worker drives.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    #[default]
    Chromium,
    Remote,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the capture queue
    pub redis_url: String,

    /// Artifact storage backend: "local" or "r2"
    #[serde(default)]
    pub artifact_backend: ArtifactBackend,

    /// Root directory for local artifacts
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,

    /// R2 bucket name (r2 backend only)
    pub r2_bucket: Option<String>,

    /// R2 endpoint URL
    pub r2_endpoint: Option<String>,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: Option<String>,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: Option<String>,

    /// Key prefix for artifacts inside the bucket
    #[serde(default = "default_snapshot_dir")]
    pub r2_prefix: String,

    /// Rendering engine: "chromium" or "remote"
    #[serde(default)]
    pub renderer: RendererKind,

    /// Path or name of the headless Chromium binary
    #[serde(default = "default_chromium_path")]
    pub chromium_path: String,

    /// Extra whitespace-separated Chromium flags (e.g. "--no-sandbox")
    pub chromium_args: Option<String>,

    /// Base URL of the remote render service
    pub render_endpoint: Option<String>,

    /// Hard limit on a single render
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,

    /// Capture workers per worker process
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Sleep between polls of an empty queue
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Re-queue jobs left in flight by a previous worker process on startup
    #[serde(default = "default_true")]
    pub recover_in_flight: bool,

    /// Snapshots older than this are swept
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Time between retention sweeps
    #[serde(default = "default_retention_interval_secs")]
    pub retention_interval_secs: u64,

    /// Address of the worker process's Prometheus scrape endpoint
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_snapshot_dir() -> String {
    "snapshots".to_string()
}

fn default_chromium_path() -> String {
    "chromium".to_string()
}

fn default_render_timeout_secs() -> u64 {
    60
}

fn default_worker_concurrency() -> usize {
    2
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> i64 {
    30
}

fn default_retention_interval_secs() -> u64 {
    3600
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.render_timeout_secs == 0 {
            return Err(ConfigError::Invalid("RENDER_TIMEOUT_SECS must be positive".into()));
        }
        if self.worker_concurrency == 0 {
            return Err(ConfigError::Invalid("WORKER_CONCURRENCY must be positive".into()));
        }
        if self.retention_days <= 0 {
            return Err(ConfigError::Invalid("RETENTION_DAYS must be positive".into()));
        }
        if self.renderer == RendererKind::Remote && self.render_endpoint.is_none() {
            return Err(ConfigError::Missing("RENDER_ENDPOINT"));
        }
        self.worker_metrics_socket()?;
        Ok(())
    }

    pub fn worker_metrics_socket(&self) -> Result<SocketAddr, ConfigError> {
        self.worker_metrics_addr.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "WORKER_METRICS_ADDR is not a socket address: {}",
                self.worker_metrics_addr
            ))
        })
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retention_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }

    pub fn retention_interval(&self) -> Duration {
        Duration::from_secs(self.retention_interval_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
