// Notifier - member status and edge-triggered events
//
// Read-side only: nothing here mutates a queue. `poll_events` diffs against
// the persisted observer ledger; `watch` diffs against the previous state it
// received on the in-process feed.

use super::feed::{FeedItem, StateFeed};
use crate::domain::{
    estimate_position, transition_events, DomainError, Observation, PositionView, QueueEvent,
};
use crate::error::{AppError, Result};
use crate::port::{ObserverLedger, QueueStore, TimeProvider};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Buffered events per watcher
pub const WATCH_CHANNEL_CAPACITY: usize = 64;

/// Ledger compare-and-set attempts per poll before yielding to concurrent polls
const MAX_POLL_ATTEMPTS: u32 = 4;

pub struct Notifier {
    store: Arc<dyn QueueStore>,
    ledger: Arc<dyn ObserverLedger>,
    time_provider: Arc<dyn TimeProvider>,
    feed: StateFeed,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn QueueStore>,
        ledger: Arc<dyn ObserverLedger>,
        time_provider: Arc<dyn TimeProvider>,
        feed: StateFeed,
    ) -> Self {
        Self {
            store,
            ledger,
            time_provider,
            feed,
        }
    }

    /// Current position, ETA and queue phase for one member
    pub async fn status(&self, queue_id: &str, member_id: &str) -> Result<PositionView> {
        let queue = self
            .store
            .find_by_id(queue_id)
            .await?
            .ok_or_else(|| AppError::queue_not_found(queue_id))?;

        estimate_position(&queue, member_id, self.time_provider.now_millis()).ok_or_else(|| {
            AppError::Domain(DomainError::NotAMember {
                member_id: member_id.to_string(),
            })
        })
    }

    /// Events since this member's last poll.
    ///
    /// The first poll records a baseline. Once the queue is gone, an observer
    /// with a ledger entry gets `RemovedFromQueue` once; later polls fail
    /// `NotFound`. Concurrent polls for one observer race on the ledger
    /// write; only the winner reports the transition.
    pub async fn poll_events(&self, queue_id: &str, member_id: &str) -> Result<Vec<QueueEvent>> {
        for attempt in 1..=MAX_POLL_ATTEMPTS {
            let previous = self.ledger.load(queue_id, member_id).await?;
            let queue = self.store.find_by_id(queue_id).await?;

            if queue.is_none() && previous.is_none() {
                // a concurrent poll already delivered the removal
                if attempt > 1 {
                    return Ok(Vec::new());
                }
                return Err(AppError::queue_not_found(queue_id));
            }

            let now = self.time_provider.now_millis();
            let view = queue
                .as_ref()
                .and_then(|queue| estimate_position(queue, member_id, now));
            let events = transition_events(queue_id, previous.as_ref(), view.as_ref());

            if self
                .record(queue_id, member_id, previous.as_ref(), view.as_ref())
                .await?
            {
                if !events.is_empty() {
                    debug!(queue_id = %queue_id, member_id = %member_id, count = events.len(), "Events emitted");
                }
                return Ok(events);
            }
            debug!(queue_id = %queue_id, member_id = %member_id, attempt, "Observer ledger moved, re-reading");
        }

        // every attempt lost to a concurrent poll, which reported the events
        Ok(Vec::new())
    }

    /// Write the new observation; false if the ledger changed since `previous` was loaded
    async fn record(
        &self,
        queue_id: &str,
        member_id: &str,
        previous: Option<&Observation>,
        view: Option<&PositionView>,
    ) -> Result<bool> {
        match (previous, view.map(Observation::of)) {
            (Some(prev), Some(next)) if *prev == next => Ok(true),
            (_, Some(next)) => {
                self.ledger
                    .compare_and_store(queue_id, member_id, previous, &next)
                    .await
            }
            (Some(prev), None) => self.ledger.compare_and_forget(queue_id, member_id, prev).await,
            (None, None) => Ok(true),
        }
    }

    /// Mark the ledger entries of an ended queue for purging
    pub async fn retire_queue(&self, queue_id: &str) -> Result<u64> {
        self.ledger
            .retire_queue(queue_id, self.time_provider.now_millis())
            .await
    }

    /// Live event stream for one member, fed by committed states.
    ///
    /// The stream ends when the queue ends, the member is gone or served, or
    /// the receiver is dropped.
    pub fn watch(&self, queue_id: &str, member_id: &str) -> mpsc::Receiver<QueueEvent> {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        // subscribe before the initial read so no commit falls in between
        let updates = self.feed.subscribe();
        let watcher = Watcher {
            store: Arc::clone(&self.store),
            time_provider: Arc::clone(&self.time_provider),
            queue_id: queue_id.to_string(),
            member_id: member_id.to_string(),
            previous: None,
            tx,
        };
        tokio::spawn(watcher.run(updates));
        rx
    }
}

struct Watcher {
    store: Arc<dyn QueueStore>,
    time_provider: Arc<dyn TimeProvider>,
    queue_id: String,
    member_id: String,
    previous: Option<Observation>,
    tx: mpsc::Sender<QueueEvent>,
}

impl Watcher {
    async fn run(mut self, mut updates: broadcast::Receiver<FeedItem>) {
        let receiver_gone = self.tx.clone();
        let mut more = self.refresh().await;

        while more {
            let update = tokio::select! {
                _ = receiver_gone.closed() => break,
                update = updates.recv() => update,
            };
            more = match update {
                Ok(FeedItem::Updated(queue)) if queue.id() == self.queue_id => {
                    let view =
                        estimate_position(&queue, &self.member_id, self.time_provider.now_millis());
                    self.emit(view).await
                }
                Ok(FeedItem::Ended(id)) if id == self.queue_id => {
                    self.emit(None).await;
                    false
                }
                Ok(_) => true,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(queue_id = %self.queue_id, skipped, "Watcher lagged, re-reading");
                    self.refresh().await
                }
                Err(broadcast::error::RecvError::Closed) => false,
            };
        }
        debug!(queue_id = %self.queue_id, member_id = %self.member_id, "Watcher stopped");
    }

    /// Re-read the queue from the store and emit the difference
    async fn refresh(&mut self) -> bool {
        match self.store.find_by_id(&self.queue_id).await {
            Ok(Some(queue)) => {
                let view =
                    estimate_position(&queue, &self.member_id, self.time_provider.now_millis());
                self.emit(view).await
            }
            Ok(None) => {
                self.emit(None).await;
                false
            }
            Err(e) => {
                warn!(queue_id = %self.queue_id, error = %e, "Watcher could not read queue");
                false
            }
        }
    }

    /// Send events for `view`; false once the stream should end
    async fn emit(&mut self, view: Option<PositionView>) -> bool {
        let events = transition_events(&self.queue_id, self.previous.as_ref(), view.as_ref());
        for event in events {
            if self.tx.send(event).await.is_err() {
                return false;
            }
        }
        self.previous = view.as_ref().map(Observation::of);
        // a served member has nothing further to hear
        view.is_some_and(|view| !view.served)
    }
}
