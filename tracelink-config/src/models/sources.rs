use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::util::{parse_bool, parse_csv, split_args};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub store: FileStoreConfig,
    #[serde(default)]
    pub jobs: FileJobsConfig,
    #[serde(default)]
    pub pipeline: FilePipelineConfig,
    #[serde(default)]
    pub cors: FileCorsConfig,
    pub dev_mode: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_upload_bytes: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileStoreConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Humantime duration, e.g. `"7d"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ttl: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileJobsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit_wait_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_pipelines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prune_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prune_after: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePipelineConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCorsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,
}

/// Environment-derived configuration values.
///
/// Durations are kept raw so the loader can report which variable was
/// malformed.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub max_upload_bytes: Option<usize>,
    pub redis_url: Option<String>,
    pub result_namespace: Option<String>,
    pub result_ttl: Option<String>,
    pub wait_timeout: Option<String>,
    pub submit_wait_timeout: Option<String>,
    pub max_concurrent_pipelines: Option<usize>,
    pub pipeline_program: Option<PathBuf>,
    pub pipeline_args: Option<Vec<String>>,
    pub pipeline_work_dir: Option<PathBuf>,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub dev_mode: Option<bool>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the environment layer from an arbitrary variable lookup.
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Self {
            config_path: var("TRACELINK_CONFIG").map(PathBuf::from),
            server_host: var("SERVER_HOST"),
            server_port: var("SERVER_PORT").and_then(|s| s.trim().parse().ok()),
            max_upload_bytes: var("MAX_UPLOAD_BYTES").and_then(|s| s.trim().parse().ok()),
            redis_url: var("REDIS_URL"),
            result_namespace: var("RESULT_NAMESPACE"),
            result_ttl: var("RESULT_TTL"),
            wait_timeout: var("WAIT_TIMEOUT"),
            submit_wait_timeout: var("SUBMIT_WAIT_TIMEOUT"),
            max_concurrent_pipelines: var("MAX_CONCURRENT_PIPELINES")
                .and_then(|s| s.trim().parse().ok()),
            pipeline_program: var("PIPELINE_PROGRAM").map(PathBuf::from),
            pipeline_args: var("PIPELINE_ARGS").map(|raw| split_args(&raw)),
            pipeline_work_dir: var("PIPELINE_WORK_DIR").map(PathBuf::from),
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS").map(|raw| parse_csv(&raw)),
            dev_mode: var("DEV_MODE").and_then(|raw| parse_bool(&raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_lookup_parses_typed_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SERVER_PORT", "9000"),
            ("MAX_CONCURRENT_PIPELINES", "not-a-number"),
            ("PIPELINE_ARGS", "--text {text} --out {output_dir}"),
            ("CORS_ALLOWED_ORIGINS", "http://a, http://b"),
            ("DEV_MODE", "on"),
            ("REDIS_URL", "   "),
        ]);
        let env = EnvConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(env.server_port, Some(9000));
        assert_eq!(env.max_concurrent_pipelines, None);
        assert_eq!(
            env.pipeline_args.unwrap(),
            vec!["--text", "{text}", "--out", "{output_dir}"]
        );
        assert_eq!(env.cors_allowed_origins.unwrap().len(), 2);
        assert_eq!(env.dev_mode, Some(true));
        assert!(env.redis_url.is_none());
    }

    #[test]
    fn file_config_rejects_unknown_keys() {
        assert!(toml::from_str::<FileConfig>("[server]\nport = 1\n[bogus]\nx = 1\n").is_err());
    }
}
