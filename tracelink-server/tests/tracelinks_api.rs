use std::{sync::Arc, time::Duration};

use anyhow::Result;
use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use tracelink_core::{
    TraceLinkType,
    testing::{GatedRunner, Scripted},
};
use tracelink_server::handlers::TraceLinkResponse;

mod common;
use common::{
    UnreachableStore, build_test_app, build_test_app_with, sad_code_form, sad_sam_form,
    sample_links, test_config,
};

const TEXT: &[u8] = b"The logic component stores carts in the store component.";

#[tokio::test]
async fn ping_reports_ok() -> Result<()> {
    let app = build_test_app(Arc::new(GatedRunner::open(Scripted::Succeed(sample_links()))))?;

    let response = app.server.get("/ping").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn health_includes_store_kind_and_registry_stats() -> Result<()> {
    let app = build_test_app(Arc::new(GatedRunner::open(Scripted::Succeed(sample_links()))))?;

    let response = app.server.get("/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["checks"]["store"]["type"], "memory");
    assert_eq!(body["checks"]["registry"]["running"], 0);
    assert_eq!(body["checks"]["pipelines"]["max_concurrent"], 2);
    Ok(())
}

#[tokio::test]
async fn start_then_wait_returns_trace_links() -> Result<()> {
    let runner = Arc::new(GatedRunner::open(Scripted::Succeed(sample_links())));
    let app = build_test_app(runner.clone())?;

    let response = app
        .server
        .post("/api/sad-sam/start")
        .multipart(sad_sam_form("teastore", TEXT))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let accepted: TraceLinkResponse = response.json();
    assert_eq!(accepted.status, 202);
    assert_eq!(accepted.trace_link_type, Some(TraceLinkType::SadSam));
    assert!(accepted.trace_links.is_none());
    let request_id = accepted.request_id.expect("request id");

    let response = app
        .server
        .get(&format!("/api/sad-sam/wait/{request_id}"))
        .await;
    response.assert_status_ok();
    let finished: TraceLinkResponse = response.json();
    assert_eq!(finished.request_id.as_deref(), Some(request_id.as_str()));
    assert_eq!(finished.trace_links, Some(sample_links()));

    // The stored result stays readable without waiting.
    let response = app.server.get(&format!("/api/sad-sam/{request_id}")).await;
    response.assert_status_ok();
    assert_eq!(runner.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn identical_submissions_share_one_run() -> Result<()> {
    let runner = Arc::new(GatedRunner::gated(Scripted::Succeed(sample_links())));
    let app = build_test_app(runner.clone())?;

    let first: TraceLinkResponse = app
        .server
        .post("/api/sad-sam/start")
        .multipart(sad_sam_form("teastore", TEXT))
        .await
        .json();
    assert!(runner.wait_for_calls(1, Duration::from_secs(5)).await);

    let second: TraceLinkResponse = app
        .server
        .post("/api/sad-sam/start")
        .multipart(sad_sam_form("teastore", TEXT))
        .await
        .json();
    assert_eq!(first.request_id, second.request_id);
    assert_eq!(second.status, 202);
    assert!(second.message.contains("already being processed"));

    let request_id = first.request_id.expect("request id");
    let running = app.server.get(&format!("/api/sad-sam/{request_id}")).await;
    running.assert_status(StatusCode::ACCEPTED);

    runner.release();
    let response = app
        .server
        .get(&format!("/api/sad-sam/wait/{request_id}"))
        .await;
    response.assert_status_ok();
    assert_eq!(runner.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn different_project_names_get_different_ids() -> Result<()> {
    let runner = Arc::new(GatedRunner::open(Scripted::Succeed(sample_links())));
    let app = build_test_app(runner)?;

    let a: TraceLinkResponse = app
        .server
        .post("/api/sad-sam/start")
        .multipart(sad_sam_form("teastore", TEXT))
        .await
        .json();
    let b: TraceLinkResponse = app
        .server
        .post("/api/sad-sam/start")
        .multipart(sad_sam_form("bigbluebutton", TEXT))
        .await
        .json();
    assert_ne!(a.request_id, b.request_id);
    Ok(())
}

#[tokio::test]
async fn unknown_request_id_is_not_found_immediately() -> Result<()> {
    let app = build_test_app(Arc::new(GatedRunner::open(Scripted::Succeed(sample_links()))))?;

    let response = app.server.get("/api/sad-code/0123abcd").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: TraceLinkResponse = response.json();
    assert_eq!(body.request_id.as_deref(), Some("0123abcd"));
    assert_eq!(body.trace_link_type, Some(TraceLinkType::SadCode));

    let started = std::time::Instant::now();
    let response = app.server.get("/api/sad-code/wait/0123abcd").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert!(started.elapsed() < Duration::from_millis(250));
    Ok(())
}

#[tokio::test]
async fn wait_times_out_while_the_job_runs() -> Result<()> {
    let runner = Arc::new(GatedRunner::gated(Scripted::Succeed(sample_links())));
    let app = build_test_app(runner.clone())?;

    let accepted: TraceLinkResponse = app
        .server
        .post("/api/sad-code/start")
        .multipart(sad_code_form("teastore", TEXT, b"class Cart {}"))
        .await
        .json();
    let request_id = accepted.request_id.expect("request id");

    let response = app
        .server
        .get(&format!("/api/sad-code/wait/{request_id}"))
        .await;
    response.assert_status(StatusCode::REQUEST_TIMEOUT);
    let body: TraceLinkResponse = response.json();
    assert_eq!(body.status, 408);

    runner.release();
    let response = app
        .server
        .get(&format!("/api/sad-code/wait/{request_id}"))
        .await;
    response.assert_status_ok();
    Ok(())
}

#[tokio::test]
async fn start_and_wait_timeout_leaves_job_running() -> Result<()> {
    let runner = Arc::new(GatedRunner::gated(Scripted::Succeed(sample_links())));
    let app = build_test_app(runner.clone())?;

    let response = app
        .server
        .post("/api/sad-sam/start-and-wait")
        .multipart(sad_sam_form("teastore", TEXT))
        .await;
    response.assert_status(StatusCode::REQUEST_TIMEOUT);
    let timed_out: TraceLinkResponse = response.json();
    let request_id = timed_out.request_id.expect("request id");

    runner.release();
    let response = app
        .server
        .get(&format!("/api/sad-sam/wait/{request_id}"))
        .await;
    response.assert_status_ok();
    let finished: TraceLinkResponse = response.json();
    assert_eq!(finished.trace_links, Some(sample_links()));
    assert_eq!(runner.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn start_and_wait_returns_result_when_fast() -> Result<()> {
    let runner = Arc::new(GatedRunner::open(Scripted::Succeed(sample_links())));
    let app = build_test_app(runner)?;

    let response = app
        .server
        .post("/api/sad-sam/start-and-wait")
        .multipart(sad_sam_form("teastore", TEXT))
        .await;
    response.assert_status_ok();
    let body: TraceLinkResponse = response.json();
    assert_eq!(body.status, 200);
    assert_eq!(body.trace_link_type, Some(TraceLinkType::SadSam));
    assert_eq!(body.trace_links, Some(sample_links()));
    Ok(())
}

#[tokio::test]
async fn pipeline_failure_is_unprocessable() -> Result<()> {
    let runner = Arc::new(GatedRunner::open(Scripted::Fail(
        "model could not be parsed".to_string(),
    )));
    let app = build_test_app(runner)?;

    let response = app
        .server
        .post("/api/sad-sam/start-and-wait")
        .multipart(sad_sam_form("teastore", TEXT))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: TraceLinkResponse = response.json();
    assert!(body.message.contains("model could not be parsed"));
    assert!(body.trace_links.is_none());

    let request_id = body.request_id.expect("request id");
    let response = app.server.get(&format!("/api/sad-sam/{request_id}")).await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[tokio::test]
async fn invalid_submissions_are_bad_requests() -> Result<()> {
    let runner = Arc::new(GatedRunner::open(Scripted::Succeed(sample_links())));
    let app = build_test_app(runner.clone())?;

    // sad-sam needs an architecture model
    let response = app
        .server
        .post("/api/sad-sam/start")
        .multipart(sad_code_form("teastore", TEXT, b"class Cart {}"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: TraceLinkResponse = response.json();
    assert_eq!(body.trace_link_type, Some(TraceLinkType::SadSam));
    assert!(body.request_id.is_none());

    let response = app
        .server
        .post("/api/sad-sam/start")
        .multipart(sad_sam_form("   ", TEXT))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = app
        .server
        .post("/api/sad-sam/start")
        .multipart(sad_sam_form("teastore", b""))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = app
        .server
        .post("/api/sad-sam/start")
        .multipart(
            MultipartForm::new()
                .add_text("projectName", "teastore")
                .add_text("architectureModelType", "ECORE")
                .add_part("inputText", Part::bytes(TEXT.to_vec()))
                .add_part("inputArchitectureModel", Part::bytes(b"<uml/>".to_vec())),
        )
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = app
        .server
        .post("/api/code-sad/start")
        .multipart(sad_sam_form("teastore", TEXT))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = app.server.get("/api/sad-sam/not%20a%20key").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    assert_eq!(runner.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn store_outage_is_service_unavailable() -> Result<()> {
    let runner = Arc::new(GatedRunner::open(Scripted::Succeed(sample_links())));
    let app = build_test_app_with(test_config(), Arc::new(UnreachableStore), runner)?;

    let response = app.server.get("/api/sad-sam/0123abcd").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: TraceLinkResponse = response.json();
    assert_eq!(body.status, 503);

    let response = app.server.get("/health").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn result_survives_failed_store_write_in_process() -> Result<()> {
    let runner = Arc::new(GatedRunner::open(Scripted::Succeed(sample_links())));
    let app = build_test_app_with(test_config(), Arc::new(UnreachableStore), runner)?;

    let response = app
        .server
        .post("/api/sad-sam/start-and-wait")
        .multipart(sad_sam_form("teastore", TEXT))
        .await;
    response.assert_status_ok();
    let body: TraceLinkResponse = response.json();
    let request_id = body.request_id.expect("request id");

    let response = app.server.get(&format!("/api/sad-sam/{request_id}")).await;
    response.assert_status_ok();

    // The failure counter is bumped right after waiters are released.
    let mut stats = app.state.orchestrator().stats();
    for _ in 0..50 {
        if stats.store_write_failures > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        stats = app.state.orchestrator().stats();
    }
    assert_eq!(stats.store_write_failures, 1);
    assert_eq!(stats.finished_in_memory, 1);
    Ok(())
}

#[tokio::test]
async fn oversized_upload_is_rejected() -> Result<()> {
    let mut config = test_config();
    config.server.max_upload_bytes = 1024;
    let runner = Arc::new(GatedRunner::open(Scripted::Succeed(sample_links())));
    let app = build_test_app_with(
        config,
        Arc::new(tracelink_core::InMemoryResultStore::new()),
        runner.clone(),
    )?;

    let response = app
        .server
        .post("/api/sad-sam/start")
        .multipart(sad_sam_form("teastore", &[b'x'; 4096]))
        .await;
    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(runner.calls(), 0);
    Ok(())
}
