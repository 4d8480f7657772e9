// Application Layer - Use Cases and Business Logic

pub mod advance;
mod applied;
pub mod breaks;
pub mod config;
pub mod engine;
pub mod feed;
pub mod lifecycle;
pub mod maintenance;
pub mod membership;
pub mod notifier;
pub mod sweeper;

// Re-exports
pub use advance::AdvanceController;
pub use applied::Applied;
pub use breaks::BreakScheduler;
pub use config::EngineConfig;
pub use engine::{EngineDeps, QueueEngine};
pub use feed::{FeedItem, StateFeed};
pub use lifecycle::{CreateQueueRequest, QueueLifecycle};
pub use maintenance::LedgerMaintenance;
pub use membership::MembershipManager;
pub use notifier::Notifier;
pub use sweeper::{
    shutdown_channel, AdvanceSweep, BreakSweep, InFlightSet, ShutdownSender, ShutdownToken,
    SweepReport, SweepTask, Sweeper,
};
