//! Recurring mining pass on the tokio timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::{CancellationFlag, LearningMiner, MiningOutcome};
use crate::domain::learning::MiningSample;

/// Supplies the trailing dataset for a mining pass.
pub trait MiningSource: Send + Sync {
    /// At most `max_samples` samples, oldest first.
    fn mining_samples(&self, max_samples: usize) -> Vec<MiningSample>;
}

/// Handle to a running schedule. Dropping it ends the task at its next wake
/// without waiting; [`MiningSchedule::stop`] also cancels an in-flight pass.
pub struct MiningSchedule {
    cancel: CancellationFlag,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MiningSchedule {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels an in-flight pass between steps and waits for the task to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.shutdown.send(true);
        if let Err(error) = self.handle.await {
            warn!(event_name = "learning.schedule.join_failed", %error, "mining schedule task failed");
        }
    }
}

/// Runs a mining pass every `interval`, the first one a full interval after
/// spawning. Passes run on the blocking pool; ticks missed while a pass runs
/// are skipped, not replayed.
pub fn spawn_schedule<F>(
    miner: Arc<LearningMiner>,
    source: Arc<dyn MiningSource>,
    interval: Duration,
    on_report: F,
) -> MiningSchedule
where
    F: Fn(&MiningOutcome) + Send + Sync + 'static,
{
    let cancel = CancellationFlag::default();
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let task_cancel = cancel.clone();
    let first_pass = Instant::now() + interval;

    let handle = tokio::spawn(async move {
        let mut ticker = time::interval_at(first_pass, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            event_name = "learning.schedule.started",
            interval_secs = interval.as_secs(),
            "mining schedule started"
        );

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let pass_miner = miner.clone();
                    let pass_source = source.clone();
                    let pass_cancel = task_cancel.clone();
                    let pass = tokio::task::spawn_blocking(move || {
                        let samples = pass_source.mining_samples(pass_miner.max_turns());
                        pass_miner.run_cancellable(&samples, &pass_cancel)
                    });
                    let outcome = match pass.await {
                        Ok(outcome) => outcome,
                        Err(error) => {
                            warn!(event_name = "learning.schedule.pass_failed", %error, "mining pass did not complete");
                            continue;
                        }
                    };
                    on_report(&outcome);
                    if matches!(outcome, MiningOutcome::Cancelled { .. }) {
                        break;
                    }
                }
            }
        }

        info!(event_name = "learning.schedule.stopped", "mining schedule stopped");
    });

    MiningSchedule { cancel, shutdown, handle }
}
