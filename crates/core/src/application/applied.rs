// Outcome of a service-level mutation

use super::feed::{FeedItem, StateFeed};
use crate::domain::Queue;
use crate::error::Result;
use crate::port::{Mutator, QueueStore, UpdateOutcome};

/// What a command did to the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// A new state was committed
    Changed(Queue),
    /// The command was a no-op against the current state
    Unchanged(Queue),
}

impl Applied {
    pub fn queue(&self) -> &Queue {
        match self {
            Applied::Changed(q) | Applied::Unchanged(q) => q,
        }
    }

    pub fn into_queue(self) -> Queue {
        match self {
            Applied::Changed(q) | Applied::Unchanged(q) => q,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, Applied::Changed(_))
    }
}

impl From<UpdateOutcome> for Applied {
    fn from(outcome: UpdateOutcome) -> Self {
        match outcome {
            UpdateOutcome::Updated(q) => Applied::Changed(q),
            UpdateOutcome::ConflictNoop(q) => Applied::Unchanged(q),
        }
    }
}

/// Run `mutator` through the store and publish committed states on the feed
pub(crate) async fn apply(
    store: &dyn QueueStore,
    feed: &StateFeed,
    queue_id: &str,
    mutator: &mut Mutator<'_>,
) -> Result<Applied> {
    let outcome = store.atomic_update(queue_id, mutator).await?;
    if let UpdateOutcome::Updated(queue) = &outcome {
        feed.publish(FeedItem::Updated(queue.clone()));
    }
    Ok(outcome.into())
}
