//! Periodic index rebuilds.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use treadle::Workflow;

use crate::pipeline::run_cycle;
use crate::RebuildJob;

/// Runs the index pipeline on a fixed interval until told to stop.
///
/// The first cycle starts immediately. A failed cycle is logged and the
/// next one runs on schedule; the previous generation keeps serving.
pub struct RebuildScheduler {
    workflow: Workflow,
    state_dir: PathBuf,
    interval: Duration,
}

impl fmt::Debug for RebuildScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RebuildScheduler")
            .field("state_dir", &self.state_dir)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl RebuildScheduler {
    #[must_use]
    pub fn new(workflow: Workflow, state_dir: PathBuf, interval: Duration) -> Self {
        Self {
            workflow,
            state_dir,
            interval,
        }
    }

    #[must_use]
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Run a single rebuild cycle.
    pub async fn run_once(&self, trigger: &str) -> Result<()> {
        let job = RebuildJob::new(trigger);
        log::debug!("Starting {}", job);
        run_cycle(&self.workflow, &self.state_dir, &job).await
    }

    /// Loop until `shutdown` carries `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!("Rebuilding the index every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once("schedule").await {
                        log::error!("Scheduled rebuild failed: {:#}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        log::info!("Rebuild scheduler stopping");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}
