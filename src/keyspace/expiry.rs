use super::{Clock, SharedKeyspace};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

/// Background eviction of expired keys.
///
/// Reads already hide expired keys; the sweeper only bounds memory held by
/// keys nobody reads again.
pub struct ExpirySweeper<C: Clock> {
    keyspace: SharedKeyspace<C>,
    period: Duration,
}

/// Handle to a running sweeper; `stop` waits for the task to exit.
pub struct SweeperHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Floor for the sweep period; a zero period is raised to this
pub const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

impl<C: Clock> ExpirySweeper<C> {
    pub fn new(keyspace: SharedKeyspace<C>, period: Duration) -> Self {
        ExpirySweeper {
            keyspace,
            period: period.max(MIN_SWEEP_PERIOD),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawn onto the current tokio runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        SweeperHandle { stop_tx, task }
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        let mut tick = interval(self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let evicted = self.keyspace.evict_expired();
                    if evicted > 0 {
                        debug!(evicted, "expiry sweeper evicted keys");
                    }
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        debug!("expiry sweeper stopping");
                        return;
                    }
                }
            }
        }
    }
}

impl SweeperHandle {
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "expiry sweeper task failed");
        }
    }
}
