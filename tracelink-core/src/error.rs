use thiserror::Error;

use crate::fingerprint::Fingerprint;

/// System-level failures raised by the job orchestration layer.
///
/// Pipeline failures are not represented here; they are recorded as a
/// terminal `FAILED` outcome (see [`AnalysisFailure`]).
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Result store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Corrupt result record for {fingerprint}: {reason}")]
    CorruptRecord {
        fingerprint: Fingerprint,
        reason: String,
    },

    #[error("No job or result for {0}")]
    NotFound(Fingerprint),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Whether a caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::StoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, JobError>;

/// Error raised by a pipeline run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Analysis failed: {message}")]
pub struct AnalysisFailure {
    pub message: String,
}

impl AnalysisFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
