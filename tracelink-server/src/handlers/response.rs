use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracelink_core::{FailureKind, Fingerprint, JobOutcome, TraceLinkType};

/// Body returned by every trace-link route, success or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceLinkResponse {
    pub request_id: Option<String>,
    /// Mirrors the HTTP status code.
    pub status: u16,
    pub message: String,
    pub trace_link_type: Option<TraceLinkType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_links: Option<Value>,
}

impl TraceLinkResponse {
    pub fn new(
        status: StatusCode,
        request_id: Option<&Fingerprint>,
        trace_link_type: Option<TraceLinkType>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.map(|id| id.as_str().to_string()),
            status: status.as_u16(),
            message: message.into(),
            trace_link_type,
            trace_links: None,
        }
    }

    pub fn accepted(
        request_id: &Fingerprint,
        trace_link_type: TraceLinkType,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            StatusCode::ACCEPTED,
            Some(request_id),
            Some(trace_link_type),
            message,
        )
    }

    pub fn running(request_id: &Fingerprint, trace_link_type: TraceLinkType) -> Self {
        Self::new(
            StatusCode::ACCEPTED,
            Some(request_id),
            Some(trace_link_type),
            "The result is not ready yet",
        )
    }

    pub fn not_found(request_id: &Fingerprint, trace_link_type: TraceLinkType) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            Some(request_id),
            Some(trace_link_type),
            format!("No job or result for request id {request_id}"),
        )
    }

    pub fn timed_out(request_id: &Fingerprint, trace_link_type: TraceLinkType) -> Self {
        Self::new(
            StatusCode::REQUEST_TIMEOUT,
            Some(request_id),
            Some(trace_link_type),
            "The result was not ready in time; query again with the request id",
        )
    }

    /// A finished job: 200 with the trace links, or 422 with the failure.
    pub fn finished(
        request_id: &Fingerprint,
        trace_link_type: TraceLinkType,
        outcome: &JobOutcome,
    ) -> Self {
        match outcome {
            JobOutcome::Succeeded(result) => Self {
                trace_links: Some(result.trace_links.clone()),
                ..Self::new(
                    StatusCode::OK,
                    Some(request_id),
                    Some(result.trace_link_type),
                    "The result is ready",
                )
            },
            JobOutcome::Failed(failure) => {
                let message = match failure.kind {
                    FailureKind::Analysis => {
                        format!("The pipeline failed: {}", failure.message)
                    }
                    FailureKind::Aborted => {
                        format!("The pipeline aborted: {}", failure.message)
                    }
                };
                Self::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Some(request_id),
                    Some(trace_link_type),
                    message,
                )
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for TraceLinkResponse {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}
