//! The seam to the external trace-link recovery pipeline.

use std::fmt;

use crate::error::AnalysisFailure;
use crate::fingerprint::Fingerprint;
use crate::job::TraceLinkPayload;
use crate::variant::{InputArtifact, InputKind, PipelineVariant};

pub mod command;

pub use command::{CommandPipelineRunner, CommandRunnerConfig};

/// A validated unit of work, inputs already in canonical order.
#[derive(Debug, Clone)]
pub struct PipelineJob {
    pub fingerprint: Fingerprint,
    pub project_name: String,
    pub variant: PipelineVariant,
    pub inputs: Vec<(InputKind, InputArtifact)>,
}

impl PipelineJob {
    pub fn input(&self, kind: InputKind) -> Option<&InputArtifact> {
        self.inputs
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, artifact)| artifact)
    }
}

/// Runs a pipeline to completion.
///
/// `run` blocks the calling thread; the orchestrator calls it from the
/// blocking pool.
pub trait PipelineRunner: Send + Sync + fmt::Debug {
    fn run(&self, job: &PipelineJob) -> Result<TraceLinkPayload, AnalysisFailure>;
}
