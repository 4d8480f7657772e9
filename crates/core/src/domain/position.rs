// Member Position and ETA

use super::queue::{Queue, QueuePhase};
use serde::{Deserialize, Serialize};

/// A member's place in a queue at a given instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionView {
    pub queue_id: String,
    pub member_id: String,
    pub member_index: usize,
    /// People still to be served before this member (0 once it is their turn)
    pub positions_ahead: usize,
    /// The pointer has moved past this member
    pub served: bool,
    /// `None` while the service average is only the seed and someone is ahead
    pub eta_ms: Option<i64>,
    pub current_index: usize,
    pub queue_size: usize,
    pub phase: QueuePhase,
}

impl PositionView {
    /// It is this member's turn right now
    pub fn is_turn(&self) -> bool {
        self.positions_ahead == 0 && !self.served && self.phase != QueuePhase::NotStarted
    }
}

/// Compute `member_id`'s position in `queue`, or `None` if not a member.
///
/// ETA is `positions_ahead * clamp(avg)` plus the remaining break time when
/// the queue is paused. Members already served get an ETA of zero.
pub fn estimate_position(queue: &Queue, member_id: &str, now: i64) -> Option<PositionView> {
    let member_index = queue.index_of(member_id)?;
    let current_index = queue.current_index();
    let served = member_index < current_index;
    let positions_ahead = member_index.saturating_sub(current_index);
    let phase = queue.phase(now);

    let estimate = queue.estimate();
    let eta_ms = if served || positions_ahead == 0 {
        Some(remaining_break(&phase, now).filter(|_| !served).unwrap_or(0))
    } else if estimate.is_estimated() {
        let wait = positions_ahead as i64 * estimate.eta_unit_ms();
        Some(wait + remaining_break(&phase, now).unwrap_or(0))
    } else {
        None
    };

    Some(PositionView {
        queue_id: queue.id().to_string(),
        member_id: member_id.to_string(),
        member_index,
        positions_ahead,
        served,
        eta_ms,
        current_index,
        queue_size: queue.len(),
        phase,
    })
}

fn remaining_break(phase: &QueuePhase, now: i64) -> Option<i64> {
    match phase {
        QueuePhase::OnBreak { ends_at } => Some((ends_at - now).max(0)),
        _ => None,
    }
}
