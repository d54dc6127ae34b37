//! # Acquisition Scheduler
//!
//! Fires a cycle immediately and then once per interval. Firings do not
//! wait for each other; each runs as its own task and the device manager's
//! link guard decides whether it actually gets to talk to the meter.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::acquisition::CycleOutcome;
use crate::pq_device_manager::PqDeviceManager;

pub struct Scheduler {
    manager: Arc<PqDeviceManager>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(manager: Arc<PqDeviceManager>, interval: Duration) -> Self {
        Scheduler { manager, interval }
    }

    /// Fires cycles until `shutdown` resolves, then waits for in-flight cycles.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight = JoinSet::new();
        tokio::pin!(shutdown);

        info!("Scheduler started, firing every {:?}", self.interval);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let manager = Arc::clone(&self.manager);
                    in_flight.spawn(async move {
                        let outcome = manager.fire().await;
                        log_outcome(&outcome);
                        debug!("Cycle stats: {:?}", manager.stats());
                    });
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("Cycle task ended abnormally: {e}");
                    }
                }
            }
        }

        info!("Scheduler stopping, {} cycles in flight", in_flight.len());
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Cycle task ended abnormally: {e}");
            }
        }
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Completed { .. } => info!("Cycle {outcome}"),
        CycleOutcome::Skipped(_) => warn!("Cycle {outcome}"),
        CycleOutcome::Aborted { .. } | CycleOutcome::Failed(_) => error!("Cycle {outcome}"),
    }
}
