// Observer Events
//
// Events are edge-triggered: they are derived from the difference between
// the last observation recorded for a member and the current position view,
// never from the current view alone.

use super::position::PositionView;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueueEvent {
    #[serde(rename_all = "camelCase")]
    PositionChanged {
        queue_id: String,
        new_position: usize,
    },
    #[serde(rename_all = "camelCase")]
    YourTurnNow { queue_id: String },
    #[serde(rename_all = "camelCase")]
    RemovedFromQueue { queue_id: String },
}

impl QueueEvent {
    pub fn queue_id(&self) -> &str {
        match self {
            Self::PositionChanged { queue_id, .. }
            | Self::YourTurnNow { queue_id }
            | Self::RemovedFromQueue { queue_id } => queue_id,
        }
    }
}

/// What an observer last saw for one member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub positions_ahead: usize,
    pub member_index: usize,
    pub served: bool,
    pub turn: bool,
}

impl Observation {
    pub fn of(view: &PositionView) -> Self {
        Self {
            positions_ahead: view.positions_ahead,
            member_index: view.member_index,
            served: view.served,
            turn: view.is_turn(),
        }
    }
}

/// Events for moving from `previous` to `current`.
///
/// `current` is `None` when the member is no longer in the queue or the
/// queue is gone. A missing `previous` is a first observation: it can open
/// a turn or report a completed serve, but never reports movement.
pub fn transition_events(
    queue_id: &str,
    previous: Option<&Observation>,
    current: Option<&PositionView>,
) -> Vec<QueueEvent> {
    let removed = || QueueEvent::RemovedFromQueue {
        queue_id: queue_id.to_string(),
    };

    let Some(view) = current else {
        return match previous {
            Some(prev) if !prev.served => vec![removed()],
            _ => Vec::new(),
        };
    };

    let now = Observation::of(view);
    let was_served = previous.is_some_and(|p| p.served);
    let was_turn = previous.is_some_and(|p| p.turn);

    if now.served {
        return if was_served { Vec::new() } else { vec![removed()] };
    }

    if now.turn && !was_turn {
        return vec![QueueEvent::YourTurnNow {
            queue_id: queue_id.to_string(),
        }];
    }

    match previous {
        Some(prev) if !prev.served && now.positions_ahead < prev.positions_ahead => {
            vec![QueueEvent::PositionChanged {
                queue_id: queue_id.to_string(),
                new_position: now.positions_ahead,
            }]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::code::PublicCode;
    use crate::domain::position::estimate_position;
    use crate::domain::queue::{LeavePolicy, Queue};

    const T0: i64 = 10_000;

    fn queue(members: &[&str]) -> Queue {
        let mut q =
            Queue::create("q-1", PublicCode::parse("Q4242").unwrap(), "Clinic", "owner", T0).unwrap();
        for m in members {
            q.join(m).unwrap();
        }
        q
    }

    fn observe(
        q: &Queue,
        member: &str,
        prev: Option<Observation>,
    ) -> (Vec<QueueEvent>, Option<Observation>) {
        let view = estimate_position(q, member, T0);
        let events = transition_events(q.id(), prev.as_ref(), view.as_ref());
        (events, view.as_ref().map(Observation::of))
    }

    fn step(q: &mut Queue, at: i64) {
        q.clear_lock();
        q.advance(at).unwrap();
    }

    #[test]
    fn test_baseline_does_not_report_movement() {
        let mut q = queue(&["a", "b", "c"]);
        q.start(T0);
        let (events, _) = observe(&q, "c", None);
        assert!(events.is_empty());
    }

    #[test]
    fn test_moves_then_turn_then_served() {
        let mut q = queue(&["a", "b", "c"]);
        q.start(T0);
        let (_, seen) = observe(&q, "c", None);

        step(&mut q, T0 + 1);
        let (events, seen) = observe(&q, "c", seen);
        assert_eq!(
            events,
            vec![QueueEvent::PositionChanged {
                queue_id: "q-1".into(),
                new_position: 1
            }]
        );

        step(&mut q, T0 + 2);
        let (events, seen) = observe(&q, "c", seen);
        assert_eq!(events, vec![QueueEvent::YourTurnNow { queue_id: "q-1".into() }]);

        // same state again: nothing
        let (events, seen) = observe(&q, "c", seen);
        assert!(events.is_empty());

        step(&mut q, T0 + 3);
        let (events, seen) = observe(&q, "c", seen);
        assert_eq!(events, vec![QueueEvent::RemovedFromQueue { queue_id: "q-1".into() }]);

        let (events, _) = observe(&q, "c", seen);
        assert!(events.is_empty());
    }

    #[test]
    fn test_turn_fires_when_queue_starts() {
        let mut q = queue(&["a"]);
        let (events, seen) = observe(&q, "a", None);
        assert!(events.is_empty());

        q.start(T0);
        let (events, _) = observe(&q, "a", seen);
        assert_eq!(events, vec![QueueEvent::YourTurnNow { queue_id: "q-1".into() }]);
    }

    #[test]
    fn test_keep_index_leave_can_open_turn() {
        let mut q = queue(&["a", "b", "c", "d"]);
        q.start(T0);
        step(&mut q, T0 + 1);
        step(&mut q, T0 + 2);
        let (_, seen) = observe(&q, "d", None);
        assert_eq!(seen.unwrap().positions_ahead, 1);

        // a served member leaving under KeepIndex moves d into the served slot
        q.leave("a", LeavePolicy::KeepIndex).unwrap();
        let (events, _) = observe(&q, "d", seen);
        assert_eq!(events, vec![QueueEvent::YourTurnNow { queue_id: "q-1".into() }]);
    }

    #[test]
    fn test_leaving_before_served_reports_removed() {
        let mut q = queue(&["a", "b"]);
        q.start(T0);
        let (_, seen) = observe(&q, "b", None);

        q.leave("b", LeavePolicy::PreserveRank).unwrap();
        let (events, seen) = observe(&q, "b", seen);
        assert_eq!(events, vec![QueueEvent::RemovedFromQueue { queue_id: "q-1".into() }]);
        assert!(seen.is_none());
    }

    #[test]
    fn test_served_member_leaving_is_silent() {
        let prev = Observation {
            positions_ahead: 0,
            member_index: 0,
            served: true,
            turn: false,
        };
        assert!(transition_events("q-1", Some(&prev), None).is_empty());
    }

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(QueueEvent::PositionChanged {
            queue_id: "q-1".into(),
            new_position: 3,
        })
        .unwrap();
        assert_eq!(json["type"], "PositionChanged");
        assert_eq!(json["queueId"], "q-1");
        assert_eq!(json["newPosition"], 3);
    }
}
