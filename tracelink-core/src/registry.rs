//! In-process tracking of running jobs.
//!
//! The registry is the only mutable state shared between submissions. Each
//! fingerprint maps to a slot holding a `watch` channel; registration goes
//! through the map's entry API so the check-and-insert happens under that
//! key's shard lock and unrelated fingerprints never contend.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::error::{JobError, Result};
use crate::fingerprint::Fingerprint;
use crate::job::{JobOutcome, JobState, ResultRecord};
use crate::store::ResultStore;
use crate::variant::PipelineVariant;

/// Why a wait ended without an outcome.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    #[error("deadline elapsed before the job finished")]
    TimedOut,
    #[error("job was dropped before it finished")]
    Abandoned,
}

struct JobSlot {
    state: watch::Sender<JobState>,
    project_name: String,
    variant: PipelineVariant,
    started_at: DateTime<Utc>,
    finished_at: OnceLock<Instant>,
}

impl JobSlot {
    fn new(project_name: &str, variant: PipelineVariant) -> Self {
        let (state, _) = watch::channel(JobState::Running);
        Self {
            state,
            project_name: project_name.to_string(),
            variant,
            started_at: Utc::now(),
            finished_at: OnceLock::new(),
        }
    }

    fn handle(&self, fingerprint: &Fingerprint) -> JobHandle {
        JobHandle {
            fingerprint: fingerprint.clone(),
            started_at: self.started_at,
            receiver: self.state.subscribe(),
        }
    }

    fn finish(&self, outcome: Arc<JobOutcome>) {
        let _ = self.finished_at.set(Instant::now());
        self.state.send_replace(JobState::Finished(outcome));
    }

    fn is_finished(&self) -> bool {
        self.finished_at.get().is_some()
    }

    fn is_failed(&self) -> bool {
        matches!(&*self.state.borrow(), JobState::Finished(outcome) if !outcome.is_success())
    }
}

/// A subscription to one job's state.
#[derive(Clone)]
pub struct JobHandle {
    fingerprint: Fingerprint,
    started_at: DateTime<Utc>,
    receiver: watch::Receiver<JobState>,
}

impl JobHandle {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Current state, without waiting.
    pub fn state(&self) -> JobState {
        self.receiver.borrow().clone()
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("fingerprint", &self.fingerprint)
            .field("status", &self.receiver.borrow().status())
            .finish()
    }
}

/// Result of [`JobRegistry::try_begin_or_attach`].
#[derive(Debug, Clone)]
pub enum Registration {
    /// The caller owns the job and must drive it to `complete` or
    /// `release_cached`.
    Started(JobHandle),
    /// A job for this fingerprint already exists; the caller only waits.
    Attached(JobHandle),
}

impl Registration {
    pub fn already_running(&self) -> bool {
        matches!(self, Registration::Attached(_))
    }

    pub fn handle(&self) -> &JobHandle {
        match self {
            Registration::Started(handle) | Registration::Attached(handle) => handle,
        }
    }

    pub fn into_handle(self) -> JobHandle {
        match self {
            Registration::Started(handle) | Registration::Attached(handle) => handle,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub running: usize,
    /// Terminal jobs held only in memory because their durable write failed.
    pub finished_in_memory: usize,
    pub store_write_failures: u64,
}

pub struct JobRegistry {
    jobs: DashMap<Fingerprint, Arc<JobSlot>>,
    store: Arc<dyn ResultStore>,
    store_write_failures: AtomicU64,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.jobs.len())
            .field("store", &self.store.kind())
            .field(
                "store_write_failures",
                &self.store_write_failures.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl JobRegistry {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self {
            jobs: DashMap::new(),
            store,
            store_write_failures: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    /// Registers a running job for `fingerprint` unless one exists.
    ///
    /// A slot left terminal in memory after a failed durable write is reused
    /// when it succeeded and replaced when it failed, matching how a stored
    /// record would be treated.
    pub fn try_begin_or_attach(
        &self,
        fingerprint: &Fingerprint,
        project_name: &str,
        variant: PipelineVariant,
    ) -> Registration {
        match self.jobs.entry(fingerprint.clone()) {
            Entry::Vacant(vacant) => {
                let slot = Arc::new(JobSlot::new(project_name, variant));
                let handle = slot.handle(fingerprint);
                vacant.insert(slot);
                debug!(%fingerprint, "Registered new job");
                Registration::Started(handle)
            }
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_failed() {
                    let slot = Arc::new(JobSlot::new(project_name, variant));
                    let handle = slot.handle(fingerprint);
                    occupied.insert(slot);
                    debug!(%fingerprint, "Replaced failed in-memory job");
                    Registration::Started(handle)
                } else {
                    debug!(%fingerprint, "Attached to existing job");
                    Registration::Attached(occupied.get().handle(fingerprint))
                }
            }
        }
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<JobHandle> {
        self.jobs
            .get(fingerprint)
            .map(|slot| slot.value().handle(fingerprint))
    }

    fn slot(&self, fingerprint: &Fingerprint) -> Result<Arc<JobSlot>> {
        self.jobs
            .get(fingerprint)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| JobError::Internal(format!("No registered job for {fingerprint}")))
    }

    fn remove_slot(&self, fingerprint: &Fingerprint, slot: &Arc<JobSlot>) {
        self.jobs
            .remove_if(fingerprint, |_, current| Arc::ptr_eq(current, slot));
    }

    /// Persists the outcome, releases every waiter, then forgets the job.
    ///
    /// If the store write fails the outcome is still published and the slot
    /// stays in memory so in-process readers see it; the error is returned
    /// as `StoreUnavailable`.
    pub async fn complete(
        &self,
        fingerprint: &Fingerprint,
        outcome: JobOutcome,
    ) -> Result<Arc<JobOutcome>> {
        let slot = self.slot(fingerprint)?;
        let record = ResultRecord {
            fingerprint: fingerprint.clone(),
            project_name: slot.project_name.clone(),
            variant: slot.variant,
            outcome,
            started_at: slot.started_at,
            completed_at: Utc::now(),
        };

        let persisted = self.store.put(fingerprint, &record).await;
        let status = record.status();
        let outcome = Arc::new(record.outcome);
        slot.finish(Arc::clone(&outcome));

        match persisted {
            Ok(()) => {
                self.remove_slot(fingerprint, &slot);
                info!(%fingerprint, %status, "Job completed");
                Ok(outcome)
            }
            Err(e) => {
                let failures = self.store_write_failures.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    %fingerprint,
                    %status,
                    store_unavailable = true,
                    store_write_failures = failures,
                    error = %e,
                    "Failed to persist job result; outcome kept in memory only"
                );
                Err(match e {
                    JobError::StoreUnavailable(_) => e,
                    other => JobError::StoreUnavailable(other.to_string()),
                })
            }
        }
    }

    /// Resolves an owned job from a record already in the store, without
    /// writing it again.
    pub fn release_cached(
        &self,
        fingerprint: &Fingerprint,
        record: ResultRecord,
    ) -> Result<Arc<JobOutcome>> {
        let slot = self.slot(fingerprint)?;
        let outcome = Arc::new(record.outcome);
        slot.finish(Arc::clone(&outcome));
        self.remove_slot(fingerprint, &slot);
        debug!(%fingerprint, "Released job from stored result");
        Ok(outcome)
    }

    /// Waits for the job behind `handle` to finish or for `deadline`.
    /// Timing out has no effect on the job.
    pub async fn await_completion(
        &self,
        handle: &JobHandle,
        deadline: Instant,
    ) -> std::result::Result<Arc<JobOutcome>, WaitError> {
        let mut receiver = handle.receiver.clone();
        let finished = receiver.wait_for(|state| matches!(state, JobState::Finished(_)));

        match tokio::time::timeout_at(deadline, finished).await {
            Ok(Ok(state)) => state.outcome().cloned().ok_or(WaitError::Abandoned),
            Ok(Err(_)) => Err(WaitError::Abandoned),
            Err(_) => Err(WaitError::TimedOut),
        }
    }

    /// Drops in-memory terminal slots that finished more than `older_than` ago.
    pub fn prune_finished(&self, older_than: Duration) -> usize {
        let now = Instant::now();
        let before = self.jobs.len();
        self.jobs.retain(|_, slot| match slot.finished_at.get() {
            Some(finished) => now.saturating_duration_since(*finished) < older_than,
            None => true,
        });
        let pruned = before.saturating_sub(self.jobs.len());
        if pruned > 0 {
            info!(pruned, "Pruned in-memory job results");
        }
        pruned
    }

    pub fn snapshot(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            store_write_failures: self.store_write_failures.load(Ordering::Relaxed),
            ..RegistryStats::default()
        };
        for slot in self.jobs.iter() {
            if slot.value().is_finished() {
                stats.finished_in_memory += 1;
            } else {
                stats.running += 1;
            }
        }
        stats
    }
}
