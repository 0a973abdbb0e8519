use std::fmt;
use thiserror::Error;
use url::Url;

use super::models::Config;

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("invalid Redis URL '{url}'")]
    InvalidRedisUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported Redis URL scheme '{scheme}' (expected redis, rediss or redis+unix)")]
    UnsupportedRedisScheme { scheme: String },
    #[error("max_concurrent_pipelines must be at least 1")]
    ZeroConcurrency,
    #[error("result namespace must not be empty")]
    EmptyNamespace,
    #[error("CORS wildcard origins are not allowed when DEV_MODE is false")]
    DangerousCorsWildcard,
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hint {
            Some(hint) => write!(f, "{} ({hint})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.items.iter().any(|w| w.message.contains(needle))
    }
}

pub fn apply_guard_rails(config: &Config) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    if config.jobs.max_concurrent_pipelines == 0 {
        return Err(ConfigGuardRailError::ZeroConcurrency);
    }

    if config.store.namespace.trim().is_empty() {
        return Err(ConfigGuardRailError::EmptyNamespace);
    }

    if !config.dev_mode && config.cors.is_wildcard_included() {
        return Err(ConfigGuardRailError::DangerousCorsWildcard);
    }

    match &config.store.redis_url {
        Some(raw) => validate_redis_url(raw)?,
        None => warnings.push_with_hint(
            "REDIS_URL not configured; results are kept in memory and lost on restart",
            "Set REDIS_URL (e.g. redis://127.0.0.1:6379) for durable results",
        ),
    }

    if config.store.result_ttl.is_some_and(|ttl| ttl.is_zero()) {
        warnings.push_with_hint(
            "RESULT_TTL is zero; stored results will not expire",
            "Unset RESULT_TTL or give it a positive duration such as 7d",
        );
    }

    if config.pipeline.program.is_none() {
        warnings.push_with_hint(
            "PIPELINE_PROGRAM not configured; every submitted job will fail",
            "Point PIPELINE_PROGRAM at the trace-link recovery executable",
        );
    }

    if config.jobs.submit_wait_timeout.is_zero() || config.jobs.wait_timeout.is_zero() {
        warnings.push("A zero wait timeout makes every blocking request time out immediately");
    }

    Ok(warnings)
}

fn validate_redis_url(raw: &str) -> Result<(), ConfigGuardRailError> {
    let url = Url::parse(raw.trim()).map_err(|source| ConfigGuardRailError::InvalidRedisUrl {
        url: raw.to_string(),
        source,
    })?;
    match url.scheme() {
        "redis" | "rediss" | "redis+unix" | "unix" => Ok(()),
        other => Err(ConfigGuardRailError::UnsupportedRedisScheme {
            scheme: other.to_string(),
        }),
    }
}
