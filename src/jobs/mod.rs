use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::Result;

pub mod reconciliation;
pub mod reminders;

pub use reconciliation::{Reconciler, ReconciliationSummary};
pub use reminders::{ReminderSummary, ReminderSweep};

/// A unit of background work run on a fixed schedule.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;
    async fn tick(&self) -> Result<()>;
}

#[async_trait]
impl Job for ReminderSweep {
    fn name(&self) -> &'static str {
        "reminder_sweep"
    }

    async fn tick(&self) -> Result<()> {
        self.run_once().await.map(|_| ())
    }
}

#[async_trait]
impl Job for Reconciler {
    fn name(&self) -> &'static str {
        "reconciliation_sweep"
    }

    async fn tick(&self) -> Result<()> {
        self.run_once().await.map(|_| ())
    }
}

/// Runs `job` every `period` until the shutdown flag flips. The first run
/// happens one period after start. A failing tick is logged and the
/// schedule continues.
pub fn spawn_job(job: Arc<dyn Job>, period: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(job = job.name(), every_secs = period.as_secs(), "Background job scheduled");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!(job = job.name(), "Background job stopped");
                        return;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = job.tick().await {
                        tracing::error!(job = job.name(), "Background job failed: {}", e);
                    }
                }
            }
        }
    })
}
