// Break Scheduler - pause and resume serving

use super::applied::{apply, Applied};
use super::feed::StateFeed;
use crate::domain::error::Result as DomainResult;
use crate::domain::Queue;
use crate::error::Result;
use crate::port::{Mutation, QueueStore, TimeProvider};
use std::sync::Arc;
use tracing::{debug, info};

pub struct BreakScheduler {
    store: Arc<dyn QueueStore>,
    time_provider: Arc<dyn TimeProvider>,
    feed: StateFeed,
}

impl BreakScheduler {
    pub fn new(
        store: Arc<dyn QueueStore>,
        time_provider: Arc<dyn TimeProvider>,
        feed: StateFeed,
    ) -> Self {
        Self {
            store,
            time_provider,
            feed,
        }
    }

    /// Pause for `minutes`. Refused while an unexpired no-show lock exists.
    pub async fn start_break(&self, queue_id: &str, actor: &str, minutes: u32) -> Result<Queue> {
        let now = self.time_provider.now_millis();
        let mut mutator = |q: &Queue| -> DomainResult<Mutation> {
            q.ensure_owner(actor)?;
            let mut next = q.clone();
            next.start_break(minutes, now)?;
            Ok(Mutation::Commit(next))
        };
        let queue = apply(self.store.as_ref(), &self.feed, queue_id, &mut mutator)
            .await?
            .into_queue();

        info!(
            queue_id = %queue_id,
            minutes,
            ends_at = ?queue.break_ends_at(),
            "Break started"
        );
        Ok(queue)
    }

    /// Push the current break out by `minutes`
    pub async fn extend_break(&self, queue_id: &str, actor: &str, minutes: u32) -> Result<Queue> {
        let mut mutator = |q: &Queue| -> DomainResult<Mutation> {
            q.ensure_owner(actor)?;
            let mut next = q.clone();
            next.extend_break(minutes)?;
            Ok(Mutation::Commit(next))
        };
        let queue = apply(self.store.as_ref(), &self.feed, queue_id, &mut mutator)
            .await?
            .into_queue();

        info!(
            queue_id = %queue_id,
            minutes,
            ends_at = ?queue.break_ends_at(),
            "Break extended"
        );
        Ok(queue)
    }

    /// Resume immediately. A no-op when the queue is not on break.
    pub async fn end_break(&self, queue_id: &str, actor: &str) -> Result<Applied> {
        let mut mutator = |q: &Queue| -> DomainResult<Mutation> {
            q.ensure_owner(actor)?;
            let mut next = q.clone();
            if !next.end_break() {
                return Ok(Mutation::Noop);
            }
            Ok(Mutation::Commit(next))
        };
        let applied = apply(self.store.as_ref(), &self.feed, queue_id, &mut mutator).await?;

        if applied.is_changed() {
            info!(queue_id = %queue_id, "Break ended by owner");
        }
        Ok(applied)
    }

    /// System-issued clear of a break observed as expired.
    ///
    /// Commits only if the break on record still ends at `observed_ends_at`
    /// and that time has passed, so an extension made after the sweep read
    /// the queue wins.
    pub async fn expire_break(&self, queue_id: &str, observed_ends_at: i64) -> Result<Applied> {
        let now = self.time_provider.now_millis();
        let mut mutator = |q: &Queue| -> DomainResult<Mutation> {
            if q.expired_break(now) != Some(observed_ends_at) {
                return Ok(Mutation::Noop);
            }
            let mut next = q.clone();
            next.end_break();
            Ok(Mutation::Commit(next))
        };
        let applied = apply(self.store.as_ref(), &self.feed, queue_id, &mut mutator).await?;

        if applied.is_changed() {
            info!(queue_id = %queue_id, ends_at = observed_ends_at, "Break expired");
        } else {
            debug!(queue_id = %queue_id, observed_ends_at, "Break expiry was a no-op");
        }
        Ok(applied)
    }
}
