use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use axum_test::{
    TestServer,
    multipart::{MultipartForm, Part},
};
use tracelink_config::Config;
use tracelink_core::{
    Fingerprint, InMemoryResultStore, JobError, JobRegistry, Orchestrator, OrchestratorSettings,
    PipelineRunner, ResultRecord, ResultStore, Result as CoreResult,
    testing::{GatedRunner, Scripted},
};
use tracelink_server::{AppState, create_app, infra::startup::StartupHooks};

// Code is used by test modules, but not in this scope
#[allow(unused)]
#[derive(Debug)]
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
}

#[allow(unused)]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.dev_mode = true;
    config.jobs.wait_timeout = Duration::from_millis(300);
    config.jobs.submit_wait_timeout = Duration::from_millis(300);
    config
}

#[allow(unused)]
pub fn sample_links() -> serde_json::Value {
    serde_json::json!({
        "traceLinks": [
            { "sentenceNumber": 3, "modelElementUid": "_comp_logic" },
            { "sentenceNumber": 7, "modelElementUid": "_comp_store" }
        ]
    })
}

#[allow(unused)]
pub fn build_test_app(runner: Arc<dyn PipelineRunner>) -> Result<TestApp> {
    build_test_app_with(
        test_config(),
        Arc::new(InMemoryResultStore::new()),
        runner,
    )
}

#[allow(unused)]
pub fn build_test_app_with(
    config: Config,
    store: Arc<dyn ResultStore>,
    runner: Arc<dyn PipelineRunner>,
) -> Result<TestApp> {
    let settings = OrchestratorSettings {
        wait_timeout: config.jobs.wait_timeout,
        max_concurrent_pipelines: config.jobs.max_concurrent_pipelines,
    };
    let registry = Arc::new(JobRegistry::new(store));
    let orchestrator = Arc::new(Orchestrator::new(registry, runner, settings));
    let state = AppState::new(Arc::new(config), orchestrator);
    let server = TestServer::new(create_app(state.clone()))?;
    Ok(TestApp { server, state })
}

#[allow(unused)]
pub async fn build_test_app_with_hooks<H: StartupHooks>(
    config: Config,
    hooks: &H,
) -> Result<TestApp> {
    let runner = Arc::new(GatedRunner::open(Scripted::Succeed(sample_links())));
    let app = build_test_app_with(config, Arc::new(InMemoryResultStore::new()), runner)?;
    hooks.run(&app.state).await?;
    Ok(app)
}

#[allow(unused)]
pub fn sad_sam_form(project: &str, text: &[u8]) -> MultipartForm {
    MultipartForm::new()
        .add_text("projectName", project)
        .add_text("architectureModelType", "PCM")
        .add_part(
            "inputText",
            Part::bytes(text.to_vec()).file_name("documentation.txt"),
        )
        .add_part(
            "inputArchitectureModel",
            Part::bytes(b"<repository id=\"_comp_logic\"/>".to_vec())
                .file_name("model.repository"),
        )
}

#[allow(unused)]
pub fn sad_code_form(project: &str, text: &[u8], code: &[u8]) -> MultipartForm {
    MultipartForm::new()
        .add_text("projectName", project)
        .add_part(
            "inputText",
            Part::bytes(text.to_vec()).file_name("documentation.txt"),
        )
        .add_part("inputCode", Part::bytes(code.to_vec()).file_name("code.acm"))
}

/// Store whose every call fails as if Redis were down.
#[allow(unused)]
#[derive(Debug)]
pub struct UnreachableStore;

#[async_trait]
impl ResultStore for UnreachableStore {
    async fn put(
        &self,
        _fingerprint: &Fingerprint,
        _record: &ResultRecord,
    ) -> CoreResult<()> {
        Err(JobError::StoreUnavailable("connection refused".to_string()))
    }

    async fn get(
        &self,
        _fingerprint: &Fingerprint,
    ) -> CoreResult<Option<ResultRecord>> {
        Err(JobError::StoreUnavailable("connection refused".to_string()))
    }

    async fn exists(&self, _fingerprint: &Fingerprint) -> CoreResult<bool> {
        Err(JobError::StoreUnavailable("connection refused".to_string()))
    }

    fn kind(&self) -> &'static str {
        "unreachable"
    }
}
