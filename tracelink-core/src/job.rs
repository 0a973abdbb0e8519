//! Job lifecycle states and the durable record of a finished job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::AnalysisFailure;
use crate::fingerprint::Fingerprint;
use crate::variant::{PipelineVariant, TraceLinkType};

/// Raw trace links as produced by the pipeline.
pub type TraceLinkPayload = serde_json::Value;

/// Wire form of a job's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceLinkResult {
    pub trace_link_type: TraceLinkType,
    pub trace_links: TraceLinkPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The pipeline reported an error.
    Analysis,
    /// The pipeline task died before producing a result.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<AnalysisFailure> for JobFailure {
    fn from(failure: AnalysisFailure) -> Self {
        Self {
            kind: FailureKind::Analysis,
            message: failure.message,
        }
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobOutcome {
    Succeeded(TraceLinkResult),
    Failed(JobFailure),
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Succeeded(_) => JobStatus::Succeeded,
            JobOutcome::Failed(_) => JobStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded(_))
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        JobOutcome::Failed(JobFailure {
            kind: FailureKind::Aborted,
            message: message.into(),
        })
    }
}

/// In-memory state of a registered job, observed through a watch channel.
#[derive(Debug, Clone)]
pub enum JobState {
    Running,
    Finished(Arc<JobOutcome>),
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Running => JobStatus::Running,
            JobState::Finished(outcome) => outcome.status(),
        }
    }

    pub fn outcome(&self) -> Option<&Arc<JobOutcome>> {
        match self {
            JobState::Running => None,
            JobState::Finished(outcome) => Some(outcome),
        }
    }
}

/// Durable projection of a terminal job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub fingerprint: Fingerprint,
    pub project_name: String,
    pub variant: PipelineVariant,
    pub outcome: JobOutcome,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ResultRecord {
    pub fn status(&self) -> JobStatus {
        self.outcome.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::FingerprintGenerator;
    use serde_json::json;

    #[test]
    fn record_serializes_with_status_tag() {
        let variant = PipelineVariant::new(TraceLinkType::SadCode, None);
        let record = ResultRecord {
            fingerprint: FingerprintGenerator::compute("X", &variant, &[b"doc".as_slice()]),
            project_name: "X".into(),
            variant,
            outcome: JobOutcome::Succeeded(TraceLinkResult {
                trace_link_type: TraceLinkType::SadCode,
                trace_links: json!([{"sentence": 1, "codeElement": "A"}]),
            }),
            started_at: Utc::now(),
            completed_at: Utc::now(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["outcome"]["status"], "SUCCEEDED");
        assert_eq!(value["outcome"]["trace_link_type"], "SAD_CODE");

        let back: ResultRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn analysis_failure_maps_to_failed_outcome() {
        let outcome = JobOutcome::Failed(AnalysisFailure::new("boom").into());
        assert_eq!(outcome.status(), JobStatus::Failed);
        assert!(!outcome.is_success());
        assert_eq!(JobOutcome::aborted("panic").status(), JobStatus::Failed);
    }
}
