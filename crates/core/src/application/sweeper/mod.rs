// Sweeps - periodic evaluators for expired no-show locks and breaks
//
// Each tick lists due queues, then fires one atomic attempt per queue. Store
// failures are logged and counted; the next tick simply tries again.

pub mod constants;
mod in_flight;
mod shutdown;

pub use in_flight::{InFlightClaim, InFlightSet};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use super::advance::AdvanceController;
use super::applied::Applied;
use super::breaks::BreakScheduler;
use crate::error::{AppError, Result};
use crate::port::{QueueStore, TimeProvider};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Counters for one sweep tick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub committed: usize,
    pub noop: usize,
    pub skipped_in_flight: usize,
    pub failed: usize,
}

/// One kind of expiry evaluation
#[async_trait]
pub trait SweepTask: Send + Sync {
    fn name(&self) -> &'static str;

    /// Queues due at `now`, each with the timestamp that made it due
    async fn due(&self, now: i64) -> Result<Vec<(String, i64)>>;

    /// Single atomic attempt against the observed timestamp
    async fn fire(&self, queue_id: &str, observed: i64) -> Result<Applied>;
}

/// Auto-advance of expired no-show locks
pub struct AdvanceSweep {
    store: Arc<dyn QueueStore>,
    controller: Arc<AdvanceController>,
}

impl AdvanceSweep {
    pub fn new(store: Arc<dyn QueueStore>, controller: Arc<AdvanceController>) -> Self {
        Self { store, controller }
    }
}

#[async_trait]
impl SweepTask for AdvanceSweep {
    fn name(&self) -> &'static str {
        "advance"
    }

    async fn due(&self, now: i64) -> Result<Vec<(String, i64)>> {
        let queues = self.store.find_lock_expired(now).await?;
        Ok(queues
            .iter()
            .filter_map(|q| q.expired_lock(now).map(|lock| (q.id().to_string(), lock)))
            .collect())
    }

    async fn fire(&self, queue_id: &str, observed: i64) -> Result<Applied> {
        self.controller.auto_advance(queue_id, observed).await
    }
}

/// Clearing of elapsed breaks
pub struct BreakSweep {
    store: Arc<dyn QueueStore>,
    scheduler: Arc<BreakScheduler>,
}

impl BreakSweep {
    pub fn new(store: Arc<dyn QueueStore>, scheduler: Arc<BreakScheduler>) -> Self {
        Self { store, scheduler }
    }
}

#[async_trait]
impl SweepTask for BreakSweep {
    fn name(&self) -> &'static str {
        "break"
    }

    async fn due(&self, now: i64) -> Result<Vec<(String, i64)>> {
        let queues = self.store.find_break_expired(now).await?;
        Ok(queues
            .iter()
            .filter_map(|q| q.expired_break(now).map(|ends| (q.id().to_string(), ends)))
            .collect())
    }

    async fn fire(&self, queue_id: &str, observed: i64) -> Result<Applied> {
        self.scheduler.expire_break(queue_id, observed).await
    }
}

/// Drives a `SweepTask` on a fixed interval
pub struct Sweeper<T: SweepTask> {
    task: T,
    time_provider: Arc<dyn TimeProvider>,
    in_flight: InFlightSet,
    interval: Duration,
}

impl<T: SweepTask> Sweeper<T> {
    pub fn new(
        task: T,
        time_provider: Arc<dyn TimeProvider>,
        in_flight: InFlightSet,
        interval: Duration,
    ) -> Self {
        Self {
            task,
            time_provider,
            in_flight,
            interval,
        }
    }

    /// Evaluate every due queue once
    pub async fn tick(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let now = self.time_provider.now_millis();

        let due = match self.task.due(now).await {
            Ok(due) => due,
            Err(e) => {
                error!(sweep = self.task.name(), error = %e, "Sweep scan failed");
                report.failed += 1;
                return report;
            }
        };

        for (queue_id, observed) in due {
            report.examined += 1;
            let Some(_claim) = self.in_flight.try_claim(&queue_id) else {
                report.skipped_in_flight += 1;
                continue;
            };

            match self.task.fire(&queue_id, observed).await {
                Ok(Applied::Changed(_)) => report.committed += 1,
                Ok(Applied::Unchanged(_)) => report.noop += 1,
                // ended between scan and attempt
                Err(AppError::NotFound(_)) => report.noop += 1,
                Err(e) => {
                    warn!(sweep = self.task.name(), queue_id = %queue_id, error = %e, "Sweep attempt failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Tick until shutdown is requested
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(
            sweep = self.task.name(),
            interval_ms = self.interval.as_millis() as u64,
            "Sweep started"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if shutdown.is_shutdown() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    log_report(self.task.name(), &report);
                }
                _ = shutdown.wait() => {
                    info!(sweep = self.task.name(), "Sweep interrupted by shutdown");
                    break;
                }
            }
        }
        info!(sweep = self.task.name(), "Sweep stopped");
    }
}

fn log_report(sweep: &str, report: &SweepReport) {
    if report.committed > 0 || report.failed > 0 {
        info!(
            sweep,
            examined = report.examined,
            committed = report.committed,
            noop = report.noop,
            skipped = report.skipped_in_flight,
            failed = report.failed,
            "Sweep tick"
        );
    } else if report.examined > 0 {
        debug!(
            sweep,
            examined = report.examined,
            noop = report.noop,
            skipped = report.skipped_in_flight,
            "Sweep tick without changes"
        );
    }
}
