use axum::{
    Router,
    routing::{get, post},
};

use crate::{AppState, handlers::tracelinks};

/// Create the trace-link API router. `{variant}` is one of the trace-link
/// type slugs (`sad-sam`, `sad-code`, `sam-code`, `sad-sam-code`).
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/api/{variant}/start", post(tracelinks::start_handler))
        .route(
            "/api/{variant}/start-and-wait",
            post(tracelinks::start_and_wait_handler),
        )
        .route(
            "/api/{variant}/wait/{id}",
            get(tracelinks::wait_for_result_handler),
        )
        .route("/api/{variant}/{id}", get(tracelinks::get_result_handler))
}
