//! # Tracelink Core
//!
//! Job orchestration and result caching for the trace-link recovery service.
//!
//! A submission is identified by a content-derived [`Fingerprint`]. The
//! [`JobRegistry`] guarantees at most one pipeline run per fingerprint at a
//! time and wakes every waiter when that run finishes; the [`ResultStore`]
//! keeps terminal outcomes so later reads and resubmissions can be served
//! without running the pipeline again.
//!
//! ## Modules
//!
//! - [`variant`]: trace-link types, model formats and submissions
//! - [`fingerprint`]: job identity
//! - [`store`]: durable result storage (Redis or in-memory)
//! - [`registry`]: in-flight jobs and waiter wakeups
//! - [`pipeline`]: the runner seam and the external-command runner
//! - [`orchestrator`]: submit, poll and bounded wait
//!
//! ## Feature Flags
//!
//! - `test-utils`: exposes [`testing`] runners for downstream tests

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod error;
pub mod fingerprint;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod store;
pub mod variant;

#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod testing;

pub use error::{AnalysisFailure, JobError, Result};
pub use fingerprint::{Fingerprint, FingerprintGenerator};
pub use job::{
    FailureKind, JobFailure, JobOutcome, JobState, JobStatus, ResultRecord, TraceLinkPayload,
    TraceLinkResult,
};
pub use orchestrator::{
    DEFAULT_WAIT_TIMEOUT, Disposition, Orchestrator, OrchestratorSettings, ResultStatus,
    SubmitReceipt, WaitStatus,
};
pub use pipeline::{CommandPipelineRunner, CommandRunnerConfig, PipelineJob, PipelineRunner};
pub use registry::{JobHandle, JobRegistry, Registration, RegistryStats, WaitError};
pub use store::{InMemoryResultStore, RedisResultStore, ResultStore};
pub use variant::{
    ArchitectureModelType, InputArtifact, InputKind, PipelineVariant, Submission, TraceLinkType,
};
