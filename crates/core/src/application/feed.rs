// State Feed - in-process stream of committed queue states

use crate::domain::{Queue, QueueId};
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of buffered items per subscriber
pub const DEFAULT_FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedItem {
    /// A mutation was committed; carries the new state
    Updated(Queue),
    /// The queue was deleted
    Ended(QueueId),
}

impl FeedItem {
    pub fn queue_id(&self) -> &str {
        match self {
            FeedItem::Updated(queue) => queue.id(),
            FeedItem::Ended(id) => id,
        }
    }
}

/// Broadcast of every committed state. Publishing never blocks; slow
/// subscribers see `RecvError::Lagged` and must re-read from the store.
#[derive(Clone)]
pub struct StateFeed {
    tx: broadcast::Sender<FeedItem>,
}

impl StateFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedItem> {
        self.tx.subscribe()
    }

    pub fn publish(&self, item: FeedItem) {
        // an error only means nobody is listening
        if self.tx.send(item).is_err() {
            trace!("state feed has no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StateFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}
