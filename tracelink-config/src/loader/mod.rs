pub mod error;

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use self::error::ConfigLoadError;
use crate::models::{
    Config, ConfigMetadata, CorsConfig, DEFAULT_HOST, DEFAULT_MAX_CONCURRENT_PIPELINES,
    DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_NAMESPACE, DEFAULT_PORT, DEFAULT_PRUNE_AFTER,
    DEFAULT_PRUNE_INTERVAL, DEFAULT_SUBMIT_WAIT_TIMEOUT, DEFAULT_WAIT_TIMEOUT, JobsConfig,
    PipelineConfig, ServerConfig, StoreConfig, default_cors_origins,
};
use crate::models::sources::{EnvConfig, FileConfig};
use crate::util::parse_duration;
use crate::validation::{self, ConfigWarnings};

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["tracelink.toml", "config/tracelink.toml"];

#[derive(Debug, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Whether to read a `.env` file into the process environment first.
    pub load_env_file: bool,
}

impl Default for ConfigLoaderOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            env_file: None,
            load_env_file: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn without_env_file(mut self) -> Self {
        self.options.load_env_file = false;
        self
    }

    /// Loads `.env`, then composes file and process environment layers.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;
        self.compose(EnvConfig::gather(), env_file_loaded)
    }

    /// Composes the file layer with an explicit environment layer. The
    /// process environment is not consulted.
    pub fn load_with_env(&self, env: EnvConfig) -> Result<ConfigLoad, ConfigLoadError> {
        self.compose(env, false)
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        if !self.options.load_env_file {
            return Ok(false);
        }
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        match loaded {
            Ok(loaded) => Ok(loaded),
            Err(err) if err.not_found() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn compose(&self, env: EnvConfig, env_file_loaded: bool) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;

        let mut warnings = ConfigWarnings::default();
        if config_path.is_none() {
            warnings.push_with_hint(
                "No tracelink.toml detected; using defaults and environment variables",
                "Pass --config or set TRACELINK_CONFIG to use a configuration file",
            );
        }

        let FileConfig {
            server: file_server,
            store: file_store,
            jobs: file_jobs,
            pipeline: file_pipeline,
            cors: file_cors,
            dev_mode: file_dev_mode,
        } = file_config.unwrap_or_default();

        let server = ServerConfig {
            host: env
                .server_host
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: env.server_port.or(file_server.port).unwrap_or(DEFAULT_PORT),
            max_upload_bytes: env
                .max_upload_bytes
                .or(file_server.max_upload_bytes)
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        };

        let store = StoreConfig {
            redis_url: env.redis_url.or(file_store.redis_url),
            namespace: env
                .result_namespace
                .or(file_store.namespace)
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            result_ttl: layered_duration(
                "RESULT_TTL",
                env.result_ttl,
                file_store.result_ttl,
            )?,
        };

        let jobs = JobsConfig {
            wait_timeout: layered_duration("WAIT_TIMEOUT", env.wait_timeout, file_jobs.wait_timeout)?
                .unwrap_or(DEFAULT_WAIT_TIMEOUT),
            submit_wait_timeout: layered_duration(
                "SUBMIT_WAIT_TIMEOUT",
                env.submit_wait_timeout,
                file_jobs.submit_wait_timeout,
            )?
            .unwrap_or(DEFAULT_SUBMIT_WAIT_TIMEOUT),
            max_concurrent_pipelines: env
                .max_concurrent_pipelines
                .or(file_jobs.max_concurrent_pipelines)
                .unwrap_or(DEFAULT_MAX_CONCURRENT_PIPELINES),
            prune_interval: layered_duration("jobs.prune_interval", None, file_jobs.prune_interval)?
                .unwrap_or(DEFAULT_PRUNE_INTERVAL),
            prune_after: layered_duration("jobs.prune_after", None, file_jobs.prune_after)?
                .unwrap_or(DEFAULT_PRUNE_AFTER),
        };

        let pipeline = PipelineConfig {
            program: env.pipeline_program.or(file_pipeline.program),
            args: env
                .pipeline_args
                .or(file_pipeline.args)
                .unwrap_or_default(),
            work_dir: env.pipeline_work_dir.or(file_pipeline.work_dir),
        };

        let cors = CorsConfig {
            allowed_origins: env
                .cors_allowed_origins
                .or(file_cors.allowed_origins)
                .unwrap_or_else(default_cors_origins),
        };

        let config = Config {
            server,
            store,
            jobs,
            pipeline,
            cors,
            dev_mode: env.dev_mode.or(file_dev_mode).unwrap_or(false),
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        };

        warnings.extend(validation::apply_guard_rails(&config)?);
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let mut source = ConfigPathSource::default();

        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env.config_path {
            source.env = Some(from_env.clone());
        } else {
            source.default = DEFAULT_CONFIG_LOCATIONS
                .into_iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists());
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        debug!(path = %path.display(), ?provenance, "Loading configuration file");
        let file_config = read_file_config(&path)?;
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Environment value wins over the file value; either must parse.
fn layered_duration(
    key: &'static str,
    env: Option<String>,
    file: Option<String>,
) -> Result<Option<Duration>, ConfigLoadError> {
    match env.or(file) {
        Some(raw) => parse_duration(&raw)
            .map(Some)
            .map_err(|source| ConfigLoadError::InvalidDuration {
                key,
                value: raw,
                source,
            }),
        None => Ok(None),
    }
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(self, ConfigPathProvenance::Explicit | ConfigPathProvenance::Env)
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}
