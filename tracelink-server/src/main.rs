//! # Trace-link Server
//!
//! Accepts trace-link recovery submissions over HTTP, runs at most one
//! pipeline per distinct submission and serves results by request id.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tracelink_config::{Config, ConfigLoad, ConfigLoader};
use tracelink_core::{
    AnalysisFailure, CommandPipelineRunner, CommandRunnerConfig, InMemoryResultStore,
    JobRegistry, Orchestrator, OrchestratorSettings, PipelineJob, PipelineRunner,
    RedisResultStore, ResultStore, TraceLinkPayload,
};
use tracelink_server::{
    AppState, create_app,
    infra::startup::{ProdStartupHooks, StartupHooks},
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "tracelink-server")]
#[command(about = "Trace-link recovery job server with request deduplication")]
struct Cli {
    /// Path to a TOML config file (overrides TRACELINK_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,
}

/// Stand-in used when no pipeline program is configured. Every run fails,
/// which is recorded like any other analysis failure.
#[derive(Debug)]
struct UnconfiguredRunner;

impl PipelineRunner for UnconfiguredRunner {
    fn run(&self, _job: &PipelineJob) -> Result<TraceLinkPayload, AnalysisFailure> {
        Err(AnalysisFailure::new(
            "no pipeline program is configured (set PIPELINE_PROGRAM)",
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = cli.config.clone() {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host.clone() {
        config.server.host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = config.metadata.config_path.as_ref() {
        info!(path = %path.display(), "configuration file loaded");
    }

    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    let config = Arc::new(config);
    let store = build_store(&config).await?;
    let runner = build_runner(&config);

    let settings = OrchestratorSettings {
        wait_timeout: config.jobs.wait_timeout,
        max_concurrent_pipelines: config.jobs.max_concurrent_pipelines,
    };
    let registry = Arc::new(JobRegistry::new(store));
    let orchestrator = Arc::new(Orchestrator::new(registry, runner, settings));
    info!(
        max_concurrent_pipelines = settings.max_concurrent_pipelines,
        wait_timeout = ?settings.wait_timeout,
        submit_wait_timeout = ?config.jobs.submit_wait_timeout,
        "orchestrator ready"
    );

    let state = AppState::new(Arc::clone(&config), orchestrator);
    ProdStartupHooks
        .run(&state)
        .await
        .context("startup hooks failed")?;

    let router = create_app(state);

    info!(
        "Starting trace-link server on {}:{}",
        config.server.host, config.server.port
    );
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
            .await
            .with_context(|| {
                format!(
                    "failed to bind {}:{}",
                    config.server.host, config.server.port
                )
            })?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn ResultStore>> {
    match config.store.redis_url.as_deref() {
        Some(url) => {
            let store =
                RedisResultStore::connect(url, &config.store.namespace, config.store.result_ttl)
                    .await
                    .context("failed to connect to Redis result store")?;
            info!(namespace = %config.store.namespace, "using Redis result store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("REDIS_URL not set; results are kept in memory and lost on restart");
            Ok(Arc::new(InMemoryResultStore::new()))
        }
    }
}

fn build_runner(config: &Config) -> Arc<dyn PipelineRunner> {
    match config.pipeline.program.clone() {
        Some(program) => {
            info!(program = %program.display(), "using command pipeline runner");
            Arc::new(CommandPipelineRunner::new(CommandRunnerConfig {
                program,
                args: config.pipeline.args.clone(),
                work_dir: config.pipeline.work_dir.clone(),
            }))
        }
        None => Arc::new(UnconfiguredRunner),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => warn!(error = %err, "failed to listen for shutdown signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracelink_core::{InputArtifact, Submission, TraceLinkType};

    #[test]
    fn cli_flags_parse() {
        let cli = Cli::try_parse_from([
            "tracelink-server",
            "--config",
            "conf/tracelink.toml",
            "--port",
            "9090",
            "--host",
            "127.0.0.1",
        ])
        .expect("valid flags");
        assert_eq!(cli.config, Some(PathBuf::from("conf/tracelink.toml")));
        assert_eq!(cli.port, Some(9090));
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn unconfigured_runner_fails_every_job() {
        let job = Submission::new("demo", TraceLinkType::SadCode)
            .with_text(InputArtifact::from_bytes(b"doc".to_vec()))
            .with_code(InputArtifact::from_bytes(b"code".to_vec()))
            .into_job()
            .expect("valid submission");
        let err = UnconfiguredRunner.run(&job).expect_err("no program");
        assert!(err.message.contains("PIPELINE_PROGRAM"));
    }

    #[test]
    fn runner_selection_follows_config() {
        let mut config = Config::default();
        assert!(format!("{:?}", build_runner(&config)).contains("UnconfiguredRunner"));

        config.pipeline.program = Some(PathBuf::from("/usr/bin/true"));
        assert!(format!("{:?}", build_runner(&config)).contains("CommandPipelineRunner"));
    }
}
