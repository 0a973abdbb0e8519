pub mod sources;

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_NAMESPACE: &str = "tracelink";
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SUBMIT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_CONCURRENT_PIPELINES: usize = 2;
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_PRUNE_AFTER: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub jobs: JobsConfig,
    pub pipeline: PipelineConfig,
    pub cors: CorsConfig,
    pub dev_mode: bool,
    pub metadata: ConfigMetadata,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            jobs: JobsConfig::default(),
            pipeline: PipelineConfig::default(),
            cors: CorsConfig::default(),
            dev_mode: false,
            metadata: ConfigMetadata::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Where finished job results are kept.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// `None` selects the non-durable in-memory store.
    pub redis_url: Option<String>,
    pub namespace: String,
    pub result_ttl: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            result_ttl: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// Bound for `GET /api/{variant}/wait/{id}`.
    pub wait_timeout: Duration,
    /// Bound for `POST /api/{variant}/start-and-wait`.
    pub submit_wait_timeout: Duration,
    pub max_concurrent_pipelines: usize,
    /// How often in-memory results left behind by failed store writes are swept.
    pub prune_interval: Duration,
    pub prune_after: Duration,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            submit_wait_timeout: DEFAULT_SUBMIT_WAIT_TIMEOUT,
            max_concurrent_pipelines: DEFAULT_MAX_CONCURRENT_PIPELINES,
            prune_interval: DEFAULT_PRUNE_INTERVAL,
            prune_after: DEFAULT_PRUNE_AFTER,
        }
    }
}

/// External pipeline executable.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
    pub work_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_cors_origins(),
        }
    }
}

impl CorsConfig {
    pub fn is_wildcard_included(&self) -> bool {
        self.allowed_origins
            .iter()
            .any(|origin| origin.trim() == "*")
    }
}

pub(crate) fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
