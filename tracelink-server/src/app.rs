use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{Method, StatusCode, header},
    routing::get,
};
use serde_json::{Value, json};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{debug, warn};

use tracelink_core::Fingerprint;

use crate::{AppState, routes};

/// Key probed by the health check; never written.
const HEALTH_PROBE_KEY: &str = "health-probe";

pub fn create_app(state: AppState) -> Router {
    let api = routes::create_api_router();

    // Build CORS layer (permissive in dev, allow-list in prod)
    let cors_layer = if state.config().dev_mode {
        CorsLayer::permissive()
    } else {
        let cors = &state.config().cors;
        let allow_origin = if cors.allowed_origins.is_empty() || cors.is_wildcard_included() {
            AllowOrigin::any()
        } else {
            let origins: Vec<axum::http::HeaderValue> = cors
                .allowed_origins
                .iter()
                .filter_map(|s| axum::http::HeaderValue::from_str(s).ok())
                .collect();
            AllowOrigin::list(origins)
        };

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
    };

    let max_upload_bytes = state.config().server.max_upload_bytes;

    Router::new()
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .merge(api)
        // Later layers wrap earlier ones: CORS is outermost
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

async fn ping_handler() -> Result<Json<Value>, StatusCode> {
    debug!("Ping endpoint called");
    Ok(Json(json!({
        "status": "ok",
        "message": "Trace-link recovery server is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })))
}

async fn health_handler(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let orchestrator = state.orchestrator();
    let stats = orchestrator.stats();

    let mut health_status = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {
            "registry": stats,
            "pipelines": {
                "max_concurrent": orchestrator.settings().max_concurrent_pipelines,
                "idle": orchestrator.idle_permits()
            }
        }
    });

    // Check result store connectivity
    let store = state.store();
    let probe = Fingerprint::parse(HEALTH_PROBE_KEY).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    match store.exists(&probe).await {
        Ok(_) => {
            health_status["checks"]["store"] = json!({
                "status": "healthy",
                "type": store.kind()
            });
            Ok(Json(health_status))
        }
        Err(e) => {
            warn!(error = %e, store = store.kind(), "health check: result store unreachable");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
