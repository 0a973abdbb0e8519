use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use tracelink_core::{Fingerprint, JobError, TraceLinkType};

use crate::handlers::TraceLinkResponse;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub request_id: Option<Fingerprint>,
    pub trace_link_type: Option<TraceLinkType>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            request_id: None,
            trace_link_type: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub fn for_request(mut self, request_id: &Fingerprint) -> Self {
        self.request_id = Some(request_id.clone());
        self
    }

    pub fn for_variant(mut self, trace_link_type: TraceLinkType) -> Self {
        self.trace_link_type = Some(trace_link_type);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        TraceLinkResponse::new(
            self.status,
            self.request_id.as_ref(),
            self.trace_link_type,
            self.message,
        )
        .into_response()
    }
}

impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::InvalidSubmission(msg) | JobError::InvalidKey(msg) => Self::bad_request(msg),
            JobError::NotFound(fingerprint) => {
                Self::not_found(format!("No job or result for request id {fingerprint}"))
                    .for_request(&fingerprint)
            }
            JobError::StoreUnavailable(msg) => {
                tracing::error!(error = %msg, "result store unavailable");
                Self::unavailable("Result store is unavailable; retry later")
            }
            JobError::CorruptRecord { fingerprint, reason } => {
                tracing::error!(fingerprint = %fingerprint, reason = %reason, "corrupt result record");
                Self::internal("Stored result could not be read").for_request(&fingerprint)
            }
            JobError::Internal(msg) => {
                tracing::error!(error = %msg, "internal job error");
                Self::internal("Internal server error")
            }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            Self::payload_too_large(err.body_text())
        } else {
            Self::bad_request(err.body_text())
        }
    }
}
