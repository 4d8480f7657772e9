// QueueTrackr Infrastructure - SQLite Adapter
// Implements: QueueStore (optimistic CAS), ObserverLedger

mod connection;
mod error;
mod migration;
mod observer_ledger;
mod queue_store;

pub use connection::create_pool;
pub use migration::{run_migrations, schema_version};
pub use observer_ledger::SqliteObserverLedger;
pub use queue_store::SqliteQueueStore;

// sqlx::Error -> AppError goes through error::map_sqlx_error (orphan rule)
