// Domain Layer - Queue aggregate and pure read-side computations

pub mod code;
pub mod error;
pub mod estimator;
pub mod event;
pub mod position;
pub mod queue;

// Re-exports
pub use code::PublicCode;
pub use error::DomainError;
pub use estimator::ServiceEstimate;
pub use event::{transition_events, Observation, QueueEvent};
pub use position::{estimate_position, PositionView};
pub use queue::{
    AdvanceEffect, LeaveEffect, LeavePolicy, MemberId, OwnerId, Queue, QueueId, QueuePhase,
    QueueRecord,
};
