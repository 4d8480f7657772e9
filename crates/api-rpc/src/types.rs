//! RPC Request/Response Types
//!
//! Params are snake_case objects. Queue snapshots are returned in the
//! persisted camelCase record shape.

use queuetrackr_core::domain::{PositionView, Queue, QueueEvent};
use serde::{Deserialize, Serialize};

/// queue.create.v1
#[derive(Debug, Deserialize)]
pub struct CreateQueueRequest {
    pub name: String,
    pub owner_id: String,
}

/// queue.get.v1
#[derive(Debug, Deserialize)]
pub struct GetQueueRequest {
    pub queue_id: String,
}

/// queue.find_by_code.v1
#[derive(Debug, Deserialize)]
pub struct FindByCodeRequest {
    pub code: String,
}

/// queue.list_owned.v1
#[derive(Debug, Deserialize)]
pub struct ListOwnedRequest {
    pub owner_id: String,
}

/// queue.list_joined.v1
#[derive(Debug, Deserialize)]
pub struct ListJoinedRequest {
    pub member_id: String,
}

/// member.join.v1 - exactly one of `queue_id` or `code`
#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    #[serde(default)]
    pub queue_id: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    pub member_id: String,
}

/// member.leave.v1, member.status.v1, member.events.v1
#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    pub queue_id: String,
    pub member_id: String,
}

/// queue.end.v1, advance.*.v1, break.end.v1
#[derive(Debug, Deserialize)]
pub struct OwnerCommandRequest {
    pub queue_id: String,
    pub actor: String,
}

/// break.start.v1, break.extend.v1
#[derive(Debug, Deserialize)]
pub struct BreakRequest {
    pub queue_id: String,
    pub actor: String,
    pub minutes: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueResponse {
    pub queue: Queue,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueListResponse {
    pub queues: Vec<Queue>,
}

/// Result of a command that may be a no-op against the current state
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    pub changed: bool,
    pub queue: Queue,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndQueueResponse {
    pub queue_id: String,
    pub ended: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub position: PositionView,
    pub is_turn: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventsResponse {
    pub events: Vec<QueueEvent>,
}
