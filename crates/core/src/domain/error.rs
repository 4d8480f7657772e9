// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Member {member_id} already joined this queue")]
    AlreadyJoined { member_id: String },

    #[error("Member {member_id} is not in this queue")]
    NotAMember { member_id: String },

    #[error("Queue has not started")]
    NotStarted,

    #[error("Queue is on break until {ends_at}")]
    OnBreak { ends_at: i64 },

    #[error("Queue is not on break")]
    NotOnBreak,

    #[error("Queue is already on break until {ends_at}")]
    AlreadyOnBreak { ends_at: i64 },

    #[error("Queue is locked awaiting arrival until {until}")]
    Locked { until: i64 },

    #[error("Nothing left to serve")]
    NothingToServe,

    #[error("Actor {actor} does not own this queue")]
    NotOwner { actor: String },

    #[error("Invalid queue record: {0}")]
    InvalidRecord(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
