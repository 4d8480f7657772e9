// Ledger Maintenance - purge observer entries of ended queues
//
// Ending a queue stamps its ledger entries instead of deleting them, so each
// observer can still poll once for `RemovedFromQueue`. Entries past the
// retention window are deleted here whether or not anyone came back.

use super::sweeper::ShutdownToken;
use crate::error::Result;
use crate::port::{ObserverLedger, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

pub struct LedgerMaintenance {
    ledger: Arc<dyn ObserverLedger>,
    time_provider: Arc<dyn TimeProvider>,
    retention: Duration,
    interval: Duration,
}

impl LedgerMaintenance {
    /// # Arguments
    /// * `retention` - How long a retired entry stays pollable
    /// * `interval` - How often to purge
    pub fn new(
        ledger: Arc<dyn ObserverLedger>,
        time_provider: Arc<dyn TimeProvider>,
        retention: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            ledger,
            time_provider,
            retention,
            interval,
        }
    }

    /// Purge once; returns the number of deleted entries
    pub async fn run_now(&self) -> Result<u64> {
        let retention_ms = i64::try_from(self.retention.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.time_provider.now_millis().saturating_sub(retention_ms);
        let purged = self.ledger.purge_retired(cutoff).await?;
        if purged > 0 {
            info!(purged, cutoff, "Purged retired observer entries");
        } else {
            debug!(cutoff, "No retired observer entries to purge");
        }
        Ok(purged)
    }

    /// Purge on every interval until shutdown
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            retention_ms = self.retention.as_millis() as u64,
            "Ledger maintenance started"
        );

        let mut tick = interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !shutdown.is_shutdown() {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.run_now().await {
                        error!(error = %e, "Ledger maintenance failed");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }
        info!("Ledger maintenance stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::sweeper::shutdown_channel;
    use crate::domain::Observation;
    use crate::port::observer_ledger::memory::InMemoryObserverLedger;
    use crate::port::time_provider::mocks::ManualClock;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    async fn seeded_ledger() -> Arc<InMemoryObserverLedger> {
        let ledger = Arc::new(InMemoryObserverLedger::new());
        let seen = Observation {
            positions_ahead: 1,
            member_index: 2,
            served: false,
            turn: false,
        };
        for (queue, member) in [("q-1", "a"), ("q-1", "b"), ("q-2", "a")] {
            ledger
                .compare_and_store(queue, member, None, &seen)
                .await
                .unwrap();
        }
        ledger
    }

    #[tokio::test]
    async fn test_purges_only_after_retention() {
        let ledger = seeded_ledger().await;
        let clock = Arc::new(ManualClock::new(10 * HOUR_MS));
        ledger.retire_queue("q-1", clock.now_millis()).await.unwrap();

        let maintenance = LedgerMaintenance::new(
            ledger.clone(),
            clock.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );

        clock.advance(HOUR_MS - 1);
        assert_eq!(maintenance.run_now().await.unwrap(), 0);
        assert_eq!(ledger.len(), 3);

        clock.advance(1);
        assert_eq!(maintenance.run_now().await.unwrap(), 2);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_purges_and_stops_on_shutdown() {
        let ledger = seeded_ledger().await;
        let clock = Arc::new(ManualClock::new(10 * HOUR_MS));
        ledger.retire_queue("q-2", 0).await.unwrap();

        let maintenance = Arc::new(LedgerMaintenance::new(
            ledger.clone(),
            clock,
            Duration::from_secs(3600),
            Duration::from_secs(60),
        ));
        let (tx, token) = shutdown_channel();
        let task = {
            let maintenance = Arc::clone(&maintenance);
            tokio::spawn(async move { maintenance.run(token).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ledger.len(), 2);

        tx.shutdown();
        task.await.unwrap();
    }
}
