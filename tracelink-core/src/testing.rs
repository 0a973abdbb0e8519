//! Scripted pipeline runners for tests.

use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::error::AnalysisFailure;
use crate::job::TraceLinkPayload;
use crate::pipeline::{PipelineJob, PipelineRunner};

/// Upper bound a gated run waits for `release` before failing on its own.
const GATE_TIMEOUT: Duration = Duration::from_secs(30);

/// What a scripted run does once its gate is open.
#[derive(Debug, Clone, PartialEq)]
pub enum Scripted {
    Succeed(Value),
    Fail(String),
    Panic(String),
}

/// A runner that counts invocations and can hold every run until the test
/// releases it.
#[derive(Debug)]
pub struct GatedRunner {
    open: Mutex<bool>,
    opened: Condvar,
    calls: AtomicUsize,
    script: Mutex<Scripted>,
}

impl GatedRunner {
    /// Runs complete as soon as they start.
    pub fn open(script: Scripted) -> Self {
        Self::with_gate(script, true)
    }

    /// Runs block until [`GatedRunner::release`] is called.
    pub fn gated(script: Scripted) -> Self {
        Self::with_gate(script, false)
    }

    fn with_gate(script: Scripted, open: bool) -> Self {
        Self {
            open: Mutex::new(open),
            opened: Condvar::new(),
            calls: AtomicUsize::new(0),
            script: Mutex::new(script),
        }
    }

    pub fn release(&self) {
        if let Ok(mut open) = self.open.lock() {
            *open = true;
        }
        self.opened.notify_all();
    }

    /// Closes the gate again for subsequent runs.
    pub fn hold(&self) {
        if let Ok(mut open) = self.open.lock() {
            *open = false;
        }
    }

    pub fn set_script(&self, script: Scripted) {
        if let Ok(mut current) = self.script.lock() {
            *current = script;
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Polls until at least `count` runs have started or `timeout` elapses.
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.calls() < count {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }

    fn wait_for_gate(&self) -> bool {
        let Ok(guard) = self.open.lock() else {
            return false;
        };
        match self
            .opened
            .wait_timeout_while(guard, GATE_TIMEOUT, |open| !*open)
        {
            Ok((open, _)) => *open,
            Err(_) => false,
        }
    }
}

impl PipelineRunner for GatedRunner {
    fn run(&self, job: &PipelineJob) -> Result<TraceLinkPayload, AnalysisFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.wait_for_gate() {
            return Err(AnalysisFailure::new(format!(
                "gate for {} was never released",
                job.fingerprint
            )));
        }

        let script = self
            .script
            .lock()
            .map(|script| script.clone())
            .map_err(|_| AnalysisFailure::new("script lock poisoned"))?;

        match script {
            Scripted::Succeed(payload) => Ok(payload),
            Scripted::Fail(message) => Err(AnalysisFailure::new(message)),
            Scripted::Panic(message) => panic!("{message}"),
        }
    }
}
