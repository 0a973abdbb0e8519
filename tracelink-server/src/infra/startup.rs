use anyhow::Result;
use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::infra::app_state::AppState;

#[async_trait]
pub trait StartupHooks: Send + Sync {
    async fn run(&self, state: &AppState) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct ProdStartupHooks;

#[async_trait]
impl StartupHooks for ProdStartupHooks {
    async fn run(&self, state: &AppState) -> Result<()> {
        let jobs = &state.config().jobs;
        let (every, older_than) = (jobs.prune_interval, jobs.prune_after);
        if every.is_zero() {
            info!("Finished-job pruning disabled");
            return Ok(());
        }

        let orchestrator = state.orchestrator.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let pruned = orchestrator.registry().prune_finished(older_than);
                debug!(pruned, "Prune sweep complete");
            }
        });

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopStartupHooks;

#[async_trait]
impl StartupHooks for NoopStartupHooks {
    async fn run(&self, _state: &AppState) -> Result<()> {
        Ok(())
    }
}
