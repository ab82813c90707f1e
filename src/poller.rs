//! Drives `JobStore::revalidate_jobs` on a fixed cadence.
use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::store::JobStore;

/// Periodically reconciles pending jobs. While nothing is pending it sleeps
/// until a job is added.
#[derive(Clone)]
pub struct Poller {
    store: Arc<JobStore>,
    interval: Duration,
}

impl Poller {
    pub fn new(store: Arc<JobStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Spawns the polling task onto the current runtime.
    pub fn start(self) -> PollerHandle {
        info!(interval = ?self.interval, "poller started");

        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));

        PollerHandle {
            cancel,
            task: Some(task),
        }
    }

    async fn run(self, cancel: CancellationToken) {
        loop {
            if self.store.pending_count() == 0 {
                debug!("no pending jobs, idling");
                select! {
                    _ = self.store.job_added() => continue,
                    _ = cancel.cancelled() => break,
                }
            }

            self.run_until_idle(&cancel).await;
            if cancel.is_cancelled() {
                break;
            }
        }

        debug!("poller stopped");
    }

    /// Reconciles every interval until no job is pending or `cancel` fires.
    ///
    /// A pass that has already begun runs to completion so its results are
    /// merged; cancellation takes effect between passes.
    pub async fn run_until_idle(&self, cancel: &CancellationToken) {
        let mut ticker =
            interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.store.pending_count() > 0 {
            select! {
                _ = ticker.tick() => {},
                _ = cancel.cancelled() => return,
            }

            let finished = self.store.revalidate_jobs().await;
            if finished > 0 {
                debug!(finished, "jobs finished this pass");
            }
        }
    }
}

/// Owner of a running poller. Stopping is idempotent, and dropping the
/// handle stops the poller too.
pub struct PollerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stops the poller and waits for its task to exit.
    pub async fn join(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                warn!(%error, "poller task failed");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
