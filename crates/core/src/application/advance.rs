// Advance Controller - start, move next, proceed, auto-advance
//
// Manual and automatic advances share `Queue::advance`. The automatic path
// additionally re-checks, inside the atomic step, that the lock it was
// triggered by is still the one on record and has expired; anything else is
// a no-op, which makes duplicate firing harmless.

use super::applied::{apply, Applied};
use super::feed::StateFeed;
use crate::domain::error::Result as DomainResult;
use crate::domain::{AdvanceEffect, DomainError, Queue};
use crate::error::Result;
use crate::port::{Mutation, QueueStore, TimeProvider};
use std::sync::Arc;
use tracing::{debug, info};

pub struct AdvanceController {
    store: Arc<dyn QueueStore>,
    time_provider: Arc<dyn TimeProvider>,
    feed: StateFeed,
}

impl AdvanceController {
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

    /// NotStarted -> Active. Idempotent.
    pub async fn start_queue(&self, queue_id: &str, actor: &str) -> Result<Applied> {
        let now = self.time_provider.now_millis();
        let mut mutator = |q: &Queue| -> DomainResult<Mutation> {
            q.ensure_owner(actor)?;
            let mut next = q.clone();
            if !next.start(now) {
                return Ok(Mutation::Noop);
            }
            Ok(Mutation::Commit(next))
        };
        let applied = apply(self.store.as_ref(), &self.feed, queue_id, &mut mutator).await?;

        if applied.is_changed() {
            info!(queue_id = %queue_id, members = applied.queue().len(), "Queue started");
        } else {
            debug!(queue_id = %queue_id, "Queue already started");
        }
        Ok(applied)
    }

    /// Owner-issued advance
    pub async fn move_next(&self, queue_id: &str, actor: &str) -> Result<Queue> {
        let now = self.time_provider.now_millis();
        let mut effect = None;
        let mut mutator = |q: &Queue| -> DomainResult<Mutation> {
            q.ensure_owner(actor)?;
            let mut next = q.clone();
            effect = Some(next.advance(now)?);
            Ok(Mutation::Commit(next))
        };
        let queue = apply(self.store.as_ref(), &self.feed, queue_id, &mut mutator)
            .await?
            .into_queue();

        if let Some(effect) = effect {
            log_advance(queue_id, &effect, "manual");
        }
        Ok(queue)
    }

    /// Drop the no-show lock now. A no-op when no lock is set.
    pub async fn proceed_now(&self, queue_id: &str, actor: &str) -> Result<Applied> {
        let mut mutator = |q: &Queue| -> DomainResult<Mutation> {
            q.ensure_owner(actor)?;
            let mut next = q.clone();
            if !next.clear_lock() {
                return Ok(Mutation::Noop);
            }
            Ok(Mutation::Commit(next))
        };
        let applied = apply(self.store.as_ref(), &self.feed, queue_id, &mut mutator).await?;

        if applied.is_changed() {
            info!(queue_id = %queue_id, "No-show lock cleared by owner");
        }
        Ok(applied)
    }

    /// System-issued advance for a lock observed as expired.
    ///
    /// Commits only if `observed_lock` is still the queue's lock, it has
    /// expired, and the queue is started and not on break.
    pub async fn auto_advance(&self, queue_id: &str, observed_lock: i64) -> Result<Applied> {
        let now = self.time_provider.now_millis();
        let mut effect = None;
        let mut mutator = |q: &Queue| -> DomainResult<Mutation> {
            if q.expired_lock(now) != Some(observed_lock) {
                return Ok(Mutation::Noop);
            }
            let mut next = q.clone();
            match next.advance(now) {
                Ok(e) => {
                    effect = Some(e);
                    Ok(Mutation::Commit(next))
                }
                Err(DomainError::NothingToServe) => Ok(Mutation::Noop),
                Err(e) => Err(e),
            }
        };
        let applied = apply(self.store.as_ref(), &self.feed, queue_id, &mut mutator).await?;

        match (&applied, effect) {
            (Applied::Changed(_), Some(effect)) => log_advance(queue_id, &effect, "auto"),
            _ => debug!(queue_id = %queue_id, observed_lock, "Auto-advance was a no-op"),
        }
        Ok(applied)
    }
}

fn log_advance(queue_id: &str, effect: &AdvanceEffect, trigger: &str) {
    info!(
        queue_id = %queue_id,
        trigger,
        served_index = effect.served_index,
        current_index = effect.current_index,
        lock_until = ?effect.lock_until,
        sampled = effect.sampled,
        "Queue advanced"
    );
}
