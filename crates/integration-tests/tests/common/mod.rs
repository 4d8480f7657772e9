//! Shared setup: engines over a temporary SQLite file with a manual clock.

#![allow(dead_code)]

use queuetrackr_core::application::{CreateQueueRequest, EngineConfig, EngineDeps, QueueEngine};
use queuetrackr_core::domain::{LeavePolicy, Queue};
use queuetrackr_core::port::code_generator::mocks::ScriptedCodes;
use queuetrackr_core::port::id_provider::mocks::SequentialIds;
use queuetrackr_core::port::time_provider::mocks::ManualClock;
use queuetrackr_infra_sqlite::{
    create_pool, run_migrations, SqliteObserverLedger, SqliteQueueStore,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const T0: i64 = 1_700_000_000_000;
pub const OWNER: &str = "owner";

pub fn db_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("queues.db").display())
}

/// Engine over the database at `url`. Engines opened on the same file behave
/// like separate daemon processes sharing storage.
pub async fn open_engine(
    url: &str,
    clock: Arc<ManualClock>,
    id_prefix: &str,
    codes: &[&str],
) -> QueueEngine {
    let pool = create_pool(url).await.unwrap();
    run_migrations(&pool).await.unwrap();

    QueueEngine::new(
        EngineDeps {
            store: Arc::new(SqliteQueueStore::new(pool.clone())),
            ledger: Arc::new(SqliteObserverLedger::new(pool)),
            time_provider: clock,
            id_provider: Arc::new(SequentialIds::new(id_prefix)),
            code_generator: Arc::new(ScriptedCodes::new(codes)),
        },
        EngineConfig {
            leave_policy: LeavePolicy::PreserveRank,
            in_flight_release: Duration::ZERO,
            ..EngineConfig::default()
        },
    )
}

pub async fn create_with_members(engine: &QueueEngine, name: &str, members: &[&str]) -> Queue {
    let queue = engine
        .create_queue(CreateQueueRequest {
            name: name.to_string(),
            owner_id: OWNER.to_string(),
        })
        .await
        .unwrap();
    for member in members {
        engine.join(queue.id(), member).await.unwrap();
    }
    engine.get_queue(queue.id()).await.unwrap()
}

/// Rows left in the observer ledger of the database at `url`
pub async fn ledger_rows(url: &str) -> i64 {
    let pool = create_pool(url).await.unwrap();
    let rows = sqlx::query_scalar("SELECT COUNT(*) FROM observer_positions")
        .fetch_one(&pool)
        .await
        .unwrap();
    pool.close().await;
    rows
}
