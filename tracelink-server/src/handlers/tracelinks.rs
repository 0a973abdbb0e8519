use axum::extract::{Multipart, Path, State};
use tracing::{info, warn};

use tracelink_core::{
    Disposition, Fingerprint, ResultStatus, SubmitReceipt, TraceLinkType, WaitStatus,
};

use super::{TraceLinkResponse, submission::read_submission};
use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

fn parse_variant(slug: &str) -> AppResult<TraceLinkType> {
    TraceLinkType::from_slug(slug)
        .ok_or_else(|| AppError::bad_request(format!("Unknown trace link type: {slug}")))
}

fn parse_request_id(trace_link_type: TraceLinkType, id: &str) -> AppResult<Fingerprint> {
    Fingerprint::parse(id).map_err(|err| AppError::from(err).for_variant(trace_link_type))
}

fn accepted_message(disposition: Disposition) -> &'static str {
    match disposition {
        Disposition::Started => "Your request has been accepted and is being processed",
        Disposition::Attached => "An identical request is already being processed",
        Disposition::Cached => "A result for this request is already available",
    }
}

fn accepted(receipt: &SubmitReceipt, trace_link_type: TraceLinkType) -> TraceLinkResponse {
    TraceLinkResponse::accepted(
        &receipt.fingerprint,
        trace_link_type,
        accepted_message(receipt.disposition),
    )
}

fn wait_response(
    request_id: &Fingerprint,
    trace_link_type: TraceLinkType,
    status: WaitStatus,
) -> TraceLinkResponse {
    match status {
        WaitStatus::Finished(outcome) => {
            TraceLinkResponse::finished(request_id, trace_link_type, &outcome)
        }
        WaitStatus::TimedOut => TraceLinkResponse::timed_out(request_id, trace_link_type),
        WaitStatus::NotFound => TraceLinkResponse::not_found(request_id, trace_link_type),
    }
}

/// `POST /api/{variant}/start`
pub async fn start_handler(
    State(state): State<AppState>,
    Path(variant): Path<String>,
    multipart: Multipart,
) -> AppResult<TraceLinkResponse> {
    let trace_link_type = parse_variant(&variant)?;
    let submission = read_submission(trace_link_type, multipart)
        .await
        .map_err(|err| AppError::from(err).for_variant(trace_link_type))?;

    let receipt = state
        .orchestrator()
        .submit(submission)
        .await
        .map_err(|err| AppError::from(err).for_variant(trace_link_type))?;

    info!(
        request_id = %receipt.fingerprint,
        disposition = ?receipt.disposition,
        trace_link_type = %trace_link_type,
        "submission accepted"
    );

    Ok(accepted(&receipt, trace_link_type))
}

/// `POST /api/{variant}/start-and-wait`
pub async fn start_and_wait_handler(
    State(state): State<AppState>,
    Path(variant): Path<String>,
    multipart: Multipart,
) -> AppResult<TraceLinkResponse> {
    let trace_link_type = parse_variant(&variant)?;
    let submission = read_submission(trace_link_type, multipart)
        .await
        .map_err(|err| AppError::from(err).for_variant(trace_link_type))?;

    let timeout = state.config().jobs.submit_wait_timeout;
    let (receipt, status) = state
        .orchestrator()
        .submit_and_wait(submission, timeout)
        .await
        .map_err(|err| AppError::from(err).for_variant(trace_link_type))?;

    if matches!(status, WaitStatus::TimedOut) {
        warn!(
            request_id = %receipt.fingerprint,
            timeout = ?timeout,
            "start-and-wait timed out; job keeps running"
        );
    }

    Ok(wait_response(&receipt.fingerprint, trace_link_type, status))
}

/// `GET /api/{variant}/{id}`
pub async fn get_result_handler(
    State(state): State<AppState>,
    Path((variant, id)): Path<(String, String)>,
) -> AppResult<TraceLinkResponse> {
    let trace_link_type = parse_variant(&variant)?;
    let request_id = parse_request_id(trace_link_type, &id)?;

    let status = state
        .orchestrator()
        .get_result(&request_id)
        .await
        .map_err(|err| {
            AppError::from(err)
                .for_request(&request_id)
                .for_variant(trace_link_type)
        })?;

    Ok(match status {
        ResultStatus::Running => TraceLinkResponse::running(&request_id, trace_link_type),
        ResultStatus::Finished(outcome) => {
            TraceLinkResponse::finished(&request_id, trace_link_type, &outcome)
        }
        ResultStatus::NotFound => TraceLinkResponse::not_found(&request_id, trace_link_type),
    })
}

/// `GET /api/{variant}/wait/{id}`
pub async fn wait_for_result_handler(
    State(state): State<AppState>,
    Path((variant, id)): Path<(String, String)>,
) -> AppResult<TraceLinkResponse> {
    let trace_link_type = parse_variant(&variant)?;
    let request_id = parse_request_id(trace_link_type, &id)?;

    let status = state
        .orchestrator()
        .wait_for_result(&request_id, Some(state.config().jobs.wait_timeout))
        .await
        .map_err(|err| {
            AppError::from(err)
                .for_request(&request_id)
                .for_variant(trace_link_type)
        })?;

    Ok(wait_response(&request_id, trace_link_type, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn unknown_variant_is_a_bad_request() {
        let err = parse_variant("sam-sad").expect_err("unknown slug");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(parse_variant("sad-code").ok(), Some(TraceLinkType::SadCode));
    }

    #[test]
    fn malformed_request_id_is_a_bad_request() {
        let err = parse_request_id(TraceLinkType::SadSam, "not a key").expect_err("space");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.trace_link_type, Some(TraceLinkType::SadSam));
    }
}
