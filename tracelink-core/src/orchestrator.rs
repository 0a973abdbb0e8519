//! Submission, background execution and bounded waiting.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{JobError, Result};
use crate::fingerprint::Fingerprint;
use crate::job::{JobOutcome, JobState, TraceLinkResult};
use crate::pipeline::{PipelineJob, PipelineRunner};
use crate::registry::{JobHandle, JobRegistry, Registration, RegistryStats, WaitError};
use crate::variant::Submission;

/// Default bound for `wait_for_result`.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub wait_timeout: Duration,
    pub max_concurrent_pipelines: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            max_concurrent_pipelines: 2,
        }
    }
}

/// How a submission was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// A new pipeline run was started.
    Started,
    /// A run for the same fingerprint was already in flight.
    Attached,
    /// A stored successful result was reused.
    Cached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub fingerprint: Fingerprint,
    pub disposition: Disposition,
}

/// Answer to a non-blocking read.
#[derive(Debug, Clone)]
pub enum ResultStatus {
    Running,
    Finished(Arc<JobOutcome>),
    NotFound,
}

/// Answer to a bounded wait.
#[derive(Debug, Clone)]
pub enum WaitStatus {
    Finished(Arc<JobOutcome>),
    TimedOut,
    NotFound,
}

pub struct Orchestrator {
    registry: Arc<JobRegistry>,
    runner: Arc<dyn PipelineRunner>,
    permits: Arc<Semaphore>,
    settings: OrchestratorSettings,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("runner", &self.runner)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        registry: Arc<JobRegistry>,
        runner: Arc<dyn PipelineRunner>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            registry,
            runner,
            permits: Arc::new(Semaphore::new(settings.max_concurrent_pipelines.max(1))),
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.snapshot()
    }

    /// Pipelines that could start right now without queueing.
    pub fn idle_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Registers the submission and returns its fingerprint without waiting
    /// for the pipeline.
    #[instrument(
        name = "orchestrator.submit",
        skip(self, submission),
        fields(project = %submission.project_name, trace_link_type = %submission.trace_link_type),
        err
    )]
    pub async fn submit(&self, submission: Submission) -> Result<SubmitReceipt> {
        let (receipt, _) = self.begin(submission).await?;
        Ok(receipt)
    }

    /// Submits, then waits up to `timeout` for the outcome. Timing out
    /// leaves the job running.
    #[instrument(
        name = "orchestrator.submit_and_wait",
        skip(self, submission),
        fields(project = %submission.project_name, trace_link_type = %submission.trace_link_type),
        err
    )]
    pub async fn submit_and_wait(
        &self,
        submission: Submission,
        timeout: Duration,
    ) -> Result<(SubmitReceipt, WaitStatus)> {
        let deadline = Instant::now() + timeout;
        let (receipt, handle) = self.begin(submission).await?;
        let status = self.wait_on(&handle, deadline).await?;
        Ok((receipt, status))
    }

    /// Reports the current state without blocking.
    #[instrument(
        name = "orchestrator.get_result",
        skip(self, fingerprint),
        fields(fingerprint = %fingerprint),
        err
    )]
    pub async fn get_result(&self, fingerprint: &Fingerprint) -> Result<ResultStatus> {
        if let Some(handle) = self.registry.lookup(fingerprint) {
            return Ok(match handle.state() {
                JobState::Running => ResultStatus::Running,
                JobState::Finished(outcome) => ResultStatus::Finished(outcome),
            });
        }

        match self.registry.store().get(fingerprint).await? {
            Some(record) => Ok(ResultStatus::Finished(Arc::new(record.outcome))),
            None => Ok(ResultStatus::NotFound),
        }
    }

    /// Waits up to `timeout` (default: the configured wait timeout) for a
    /// running job. Unknown fingerprints return `NotFound` at once.
    #[instrument(
        name = "orchestrator.wait_for_result",
        skip(self, fingerprint),
        fields(fingerprint = %fingerprint),
        err
    )]
    pub async fn wait_for_result(
        &self,
        fingerprint: &Fingerprint,
        timeout: Option<Duration>,
    ) -> Result<WaitStatus> {
        let deadline = Instant::now() + timeout.unwrap_or(self.settings.wait_timeout);

        if let Some(handle) = self.registry.lookup(fingerprint) {
            return self.wait_on(&handle, deadline).await;
        }

        match self.registry.store().get(fingerprint).await? {
            Some(record) => Ok(WaitStatus::Finished(Arc::new(record.outcome))),
            None => Ok(WaitStatus::NotFound),
        }
    }

    async fn wait_on(&self, handle: &JobHandle, deadline: Instant) -> Result<WaitStatus> {
        match self.registry.await_completion(handle, deadline).await {
            Ok(outcome) => Ok(WaitStatus::Finished(outcome)),
            Err(WaitError::TimedOut) => {
                debug!(fingerprint = %handle.fingerprint(), "Wait timed out");
                Ok(WaitStatus::TimedOut)
            }
            Err(WaitError::Abandoned) => Err(JobError::Internal(format!(
                "Job {} was dropped before finishing",
                handle.fingerprint()
            ))),
        }
    }

    async fn begin(&self, submission: Submission) -> Result<(SubmitReceipt, JobHandle)> {
        let job = submission.into_job()?;
        let fingerprint = job.fingerprint.clone();

        let registration =
            self.registry
                .try_begin_or_attach(&fingerprint, &job.project_name, job.variant);

        let handle = match registration {
            Registration::Attached(handle) => {
                info!(%fingerprint, "Submission attached to existing job");
                let receipt = SubmitReceipt {
                    fingerprint,
                    disposition: Disposition::Attached,
                };
                return Ok((receipt, handle));
            }
            Registration::Started(handle) => handle,
        };

        // The owner's work runs on its own task so a dropped request cannot
        // strand the registered slot.
        let (decided, disposition) = oneshot::channel();
        tokio::spawn(drive_job(
            Arc::clone(&self.registry),
            Arc::clone(&self.runner),
            Arc::clone(&self.permits),
            job,
            decided,
        ));

        let disposition = disposition.await.unwrap_or(Disposition::Started);
        info!(%fingerprint, ?disposition, "Submission accepted");
        Ok((
            SubmitReceipt {
                fingerprint,
                disposition,
            },
            handle,
        ))
    }
}

/// Owner path for a freshly registered job: reuse a stored success, or run
/// the pipeline and complete the job.
async fn drive_job(
    registry: Arc<JobRegistry>,
    runner: Arc<dyn PipelineRunner>,
    permits: Arc<Semaphore>,
    job: PipelineJob,
    decided: oneshot::Sender<Disposition>,
) {
    let fingerprint = job.fingerprint.clone();

    match registry.store().get(&fingerprint).await {
        Ok(Some(record)) if record.outcome.is_success() => {
            match registry.release_cached(&fingerprint, record) {
                Ok(_) => {
                    info!(%fingerprint, "Reusing stored result");
                    let _ = decided.send(Disposition::Cached);
                    return;
                }
                Err(e) => warn!(%fingerprint, error = %e, "Failed to release cached result"),
            }
        }
        Ok(Some(_)) => debug!(%fingerprint, "Previous run failed; running again"),
        Ok(None) => {}
        Err(e) => warn!(%fingerprint, error = %e, "Result store lookup failed; running pipeline"),
    }

    let _ = decided.send(Disposition::Started);

    let outcome = run_pipeline(runner, permits, job).await;
    // Failures are logged and counted by the registry.
    let _ = registry.complete(&fingerprint, outcome).await;
}

async fn run_pipeline(
    runner: Arc<dyn PipelineRunner>,
    permits: Arc<Semaphore>,
    job: PipelineJob,
) -> JobOutcome {
    let fingerprint = job.fingerprint.clone();
    let trace_link_type = job.variant.trace_link_type;

    let permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return JobOutcome::aborted("Pipeline pool is shut down"),
    };

    debug!(%fingerprint, "Pipeline permit acquired");
    let started = std::time::Instant::now();
    let result = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        runner.run(&job)
    })
    .await;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(Ok(trace_links)) => {
            info!(%fingerprint, elapsed_ms, "Pipeline succeeded");
            JobOutcome::Succeeded(TraceLinkResult {
                trace_link_type,
                trace_links,
            })
        }
        Ok(Err(failure)) => {
            warn!(%fingerprint, elapsed_ms, error = %failure, "Pipeline failed");
            JobOutcome::Failed(failure.into())
        }
        Err(join_error) => {
            error!(%fingerprint, elapsed_ms, error = %join_error, "Pipeline task aborted");
            JobOutcome::aborted(format!("Pipeline task aborted: {join_error}"))
        }
    }
}
