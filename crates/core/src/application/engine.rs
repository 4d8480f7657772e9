// Queue Engine - facade wiring every service over shared ports

use super::advance::AdvanceController;
use super::applied::Applied;
use super::breaks::BreakScheduler;
use super::config::EngineConfig;
use super::feed::StateFeed;
use super::lifecycle::{CreateQueueRequest, QueueLifecycle};
use super::maintenance::LedgerMaintenance;
use super::membership::MembershipManager;
use super::notifier::Notifier;
use super::sweeper::{AdvanceSweep, BreakSweep, InFlightSet, Sweeper};
use crate::domain::{PositionView, Queue, QueueEvent};
use crate::error::Result;
use crate::port::{CodeGenerator, IdProvider, ObserverLedger, QueueStore, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Ports the engine is built from
#[derive(Clone)]
pub struct EngineDeps {
    pub store: Arc<dyn QueueStore>,
    pub ledger: Arc<dyn ObserverLedger>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub id_provider: Arc<dyn IdProvider>,
    pub code_generator: Arc<dyn CodeGenerator>,
}

pub struct QueueEngine {
    lifecycle: QueueLifecycle,
    membership: MembershipManager,
    advance: Arc<AdvanceController>,
    breaks: Arc<BreakScheduler>,
    notifier: Notifier,
    feed: StateFeed,
    store: Arc<dyn QueueStore>,
    ledger: Arc<dyn ObserverLedger>,
    time_provider: Arc<dyn TimeProvider>,
    advance_in_flight: InFlightSet,
    break_in_flight: InFlightSet,
    config: EngineConfig,
}

impl QueueEngine {
    pub fn new(deps: EngineDeps, config: EngineConfig) -> Self {
        let feed = StateFeed::default();
        let EngineDeps {
            store,
            ledger,
            time_provider,
            id_provider,
            code_generator,
        } = deps;

        Self {
            lifecycle: QueueLifecycle::new(
                Arc::clone(&store),
                id_provider,
                code_generator,
                Arc::clone(&time_provider),
                feed.clone(),
            ),
            membership: MembershipManager::new(Arc::clone(&store), feed.clone(), config.leave_policy),
            advance: Arc::new(AdvanceController::new(
                Arc::clone(&store),
                Arc::clone(&time_provider),
                feed.clone(),
            )),
            breaks: Arc::new(BreakScheduler::new(
                Arc::clone(&store),
                Arc::clone(&time_provider),
                feed.clone(),
            )),
            notifier: Notifier::new(
                Arc::clone(&store),
                Arc::clone(&ledger),
                Arc::clone(&time_provider),
                feed.clone(),
            ),
            feed,
            store,
            ledger,
            time_provider,
            advance_in_flight: InFlightSet::new(config.in_flight_release),
            break_in_flight: InFlightSet::new(config.in_flight_release),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn feed(&self) -> &StateFeed {
        &self.feed
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub async fn create_queue(&self, req: CreateQueueRequest) -> Result<Queue> {
        self.lifecycle.create_queue(req).await
    }

    pub async fn get_queue(&self, queue_id: &str) -> Result<Queue> {
        self.lifecycle.get_queue(queue_id).await
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Queue> {
        self.lifecycle.find_by_code(code).await
    }

    pub async fn list_owned(&self, owner_id: &str) -> Result<Vec<Queue>> {
        self.lifecycle.list_owned(owner_id).await
    }

    pub async fn list_joined(&self, member_id: &str) -> Result<Vec<Queue>> {
        self.lifecycle.list_joined(member_id).await
    }

    /// End the queue and retire its observer entries for later purging
    pub async fn end_queue(&self, queue_id: &str, actor: &str) -> Result<()> {
        self.lifecycle.end_queue(queue_id, actor).await?;
        let retired = self.notifier.retire_queue(queue_id).await?;
        debug!(queue_id = %queue_id, retired, "Observer entries retired");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    pub async fn join(&self, queue_id: &str, member_id: &str) -> Result<Queue> {
        self.membership.join(queue_id, member_id).await
    }

    pub async fn join_by_code(&self, code: &str, member_id: &str) -> Result<Queue> {
        self.membership.join_by_code(code, member_id).await
    }

    pub async fn leave(&self, queue_id: &str, member_id: &str) -> Result<Applied> {
        self.membership.leave(queue_id, member_id).await
    }

    // ------------------------------------------------------------------
    // Serving
    // ------------------------------------------------------------------

    pub async fn start_queue(&self, queue_id: &str, actor: &str) -> Result<Applied> {
        self.advance.start_queue(queue_id, actor).await
    }

    pub async fn move_next(&self, queue_id: &str, actor: &str) -> Result<Queue> {
        self.advance.move_next(queue_id, actor).await
    }

    pub async fn proceed_now(&self, queue_id: &str, actor: &str) -> Result<Applied> {
        self.advance.proceed_now(queue_id, actor).await
    }

    pub async fn auto_advance(&self, queue_id: &str, observed_lock: i64) -> Result<Applied> {
        self.advance.auto_advance(queue_id, observed_lock).await
    }

    // ------------------------------------------------------------------
    // Breaks
    // ------------------------------------------------------------------

    pub async fn start_break(&self, queue_id: &str, actor: &str, minutes: u32) -> Result<Queue> {
        self.breaks.start_break(queue_id, actor, minutes).await
    }

    pub async fn extend_break(&self, queue_id: &str, actor: &str, minutes: u32) -> Result<Queue> {
        self.breaks.extend_break(queue_id, actor, minutes).await
    }

    pub async fn end_break(&self, queue_id: &str, actor: &str) -> Result<Applied> {
        self.breaks.end_break(queue_id, actor).await
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    pub async fn member_status(&self, queue_id: &str, member_id: &str) -> Result<PositionView> {
        self.notifier.status(queue_id, member_id).await
    }

    pub async fn poll_events(&self, queue_id: &str, member_id: &str) -> Result<Vec<QueueEvent>> {
        self.notifier.poll_events(queue_id, member_id).await
    }

    pub fn watch(&self, queue_id: &str, member_id: &str) -> mpsc::Receiver<QueueEvent> {
        self.notifier.watch(queue_id, member_id)
    }

    // ------------------------------------------------------------------
    // Sweeps
    // ------------------------------------------------------------------

    /// Auto-advance sweep. Sweepers built from one engine share its in-flight set.
    pub fn advance_sweeper(&self, interval: Duration) -> Sweeper<AdvanceSweep> {
        Sweeper::new(
            AdvanceSweep::new(Arc::clone(&self.store), Arc::clone(&self.advance)),
            Arc::clone(&self.time_provider),
            self.advance_in_flight.clone(),
            interval,
        )
    }

    /// Periodic purge of observer entries left by ended queues
    pub fn ledger_maintenance(&self, interval: Duration) -> LedgerMaintenance {
        LedgerMaintenance::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.time_provider),
            self.config.ledger_retention,
            interval,
        )
    }

    /// Break expiry sweep
    pub fn break_sweeper(&self, interval: Duration) -> Sweeper<BreakSweep> {
        Sweeper::new(
            BreakSweep::new(Arc::clone(&self.store), Arc::clone(&self.breaks)),
            Arc::clone(&self.time_provider),
            self.break_in_flight.clone(),
            interval,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use crate::error::AppError;
    use crate::port::code_generator::mocks::ScriptedCodes;
    use crate::port::id_provider::mocks::SequentialIds;
    use crate::port::observer_ledger::memory::InMemoryObserverLedger;
    use crate::port::queue_store::memory::InMemoryQueueStore;
    use crate::port::time_provider::mocks::ManualClock;

    fn engine(clock: Arc<ManualClock>) -> QueueEngine {
        QueueEngine::new(
            EngineDeps {
                store: Arc::new(InMemoryQueueStore::new()),
                ledger: Arc::new(InMemoryObserverLedger::new()),
                time_provider: clock,
                id_provider: Arc::new(SequentialIds::new("queue")),
                code_generator: Arc::new(ScriptedCodes::new(&["Q1111", "Q2222"])),
            },
            EngineConfig::default(),
        )
    }

    fn create(name: &str) -> CreateQueueRequest {
        CreateQueueRequest {
            name: name.into(),
            owner_id: "owner".into(),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_flow() {
        let clock = Arc::new(ManualClock::new(0));
        let engine = engine(clock.clone());

        let queue = engine.create_queue(create("Clinic")).await.unwrap();
        assert_eq!(queue.public_code().as_str(), "Q1111");
        for m in ["A", "B", "C"] {
            engine.join_by_code("Q1111", m).await.unwrap();
        }
        engine.start_queue(queue.id(), "owner").await.unwrap();

        for _ in 0..3 {
            clock.advance(90_000);
            engine.proceed_now(queue.id(), "owner").await.unwrap();
            engine.move_next(queue.id(), "owner").await.unwrap();
        }

        let done = engine.get_queue(queue.id()).await.unwrap();
        assert_eq!(done.current_index(), 3);
        assert_eq!(done.estimate().avg_serve_ms, 90_000);
        assert_eq!(done.estimate().samples, 3);

        let err = engine.move_next(queue.id(), "owner").await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::NothingToServe)));
    }

    #[tokio::test]
    async fn test_end_queue_is_terminal() {
        let clock = Arc::new(ManualClock::new(0));
        let engine = engine(clock);
        let queue = engine.create_queue(create("Desk")).await.unwrap();
        engine.join(queue.id(), "m").await.unwrap();

        let err = engine.end_queue(queue.id(), "m").await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::NotOwner { .. })));

        engine.end_queue(queue.id(), "owner").await.unwrap();
        assert!(matches!(
            engine.join(queue.id(), "n").await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            engine.end_queue(queue.id(), "owner").await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(engine.list_joined("m").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feed_sees_commits_and_end() {
        let clock = Arc::new(ManualClock::new(0));
        let engine = engine(clock);
        let mut rx = engine.feed().subscribe();

        let queue = engine.create_queue(create("Desk")).await.unwrap();
        engine.join(queue.id(), "m").await.unwrap();
        engine.end_queue(queue.id(), "owner").await.unwrap();

        let mut seen = Vec::new();
        while let Ok(item) = rx.try_recv() {
            seen.push(item);
        }
        assert_eq!(seen.len(), 3);
        assert!(matches!(seen[2], crate::application::feed::FeedItem::Ended(_)));
    }

    #[tokio::test]
    async fn test_codes_stay_unique() {
        let clock = Arc::new(ManualClock::new(0));
        let engine = engine(clock);
        let a = engine.create_queue(create("A")).await.unwrap();
        let b = engine.create_queue(create("B")).await.unwrap();
        assert_ne!(a.public_code(), b.public_code());
        assert!(matches!(
            engine.create_queue(create("C")).await.unwrap_err(),
            AppError::CodeExhausted { .. }
        ));
    }

    #[tokio::test]
    async fn test_ended_queue_ledger_is_purged_after_retention() {
        let clock = Arc::new(ManualClock::new(0));
        let ledger = Arc::new(InMemoryObserverLedger::new());
        let engine = QueueEngine::new(
            EngineDeps {
                store: Arc::new(InMemoryQueueStore::new()),
                ledger: ledger.clone(),
                time_provider: clock.clone(),
                id_provider: Arc::new(SequentialIds::new("queue")),
                code_generator: Arc::new(ScriptedCodes::new(&["Q1111"])),
            },
            EngineConfig::default(),
        );

        let queue = engine.create_queue(create("Desk")).await.unwrap();
        for m in ["a", "b", "c"] {
            engine.join(queue.id(), m).await.unwrap();
            engine.poll_events(queue.id(), m).await.unwrap();
        }
        engine.end_queue(queue.id(), "owner").await.unwrap();
        assert_eq!(ledger.len(), 3);

        // "a" comes back once, the others never do
        assert_eq!(engine.poll_events(queue.id(), "a").await.unwrap().len(), 1);
        assert_eq!(ledger.len(), 2);

        let maintenance = engine.ledger_maintenance(Duration::from_secs(60));
        assert_eq!(maintenance.run_now().await.unwrap(), 0);
        clock.advance(EngineConfig::default().ledger_retention.as_millis() as i64);
        assert_eq!(maintenance.run_now().await.unwrap(), 2);
        assert!(ledger.is_empty());
    }
}
