// Queue Store Port (Interface)
//
// `atomic_update` is the single serialization point of the engine: for one
// queue id, a mutator's read and the matching write are linearizable with
// respect to every other `atomic_update` on that id.

use crate::domain::error::Result as DomainResult;
use crate::domain::{PublicCode, Queue};
use crate::error::{AppError, Result};
use async_trait::async_trait;

/// What a mutator wants done with the state it was shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Persist this successor state
    Commit(Queue),
    /// Leave the queue as it is
    Noop,
}

/// Result of an `atomic_update` that found the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The mutator's state was written
    Updated(Queue),
    /// The mutator declined; carries the state it saw last
    ConflictNoop(Queue),
}

impl UpdateOutcome {
    pub fn queue(&self) -> &Queue {
        match self {
            Self::Updated(q) | Self::ConflictNoop(q) => q,
        }
    }

    pub fn into_queue(self) -> Queue {
        match self {
            Self::Updated(q) | Self::ConflictNoop(q) => q,
        }
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated(_))
    }
}

/// Read-modify-write callback. May be invoked more than once per call when an
/// adapter retries after losing a race, so it must not have side effects.
pub type Mutator<'a> = dyn FnMut(&Queue) -> DomainResult<Mutation> + Send + 'a;

/// Repository interface for queue persistence
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a new queue. Fails with `Conflict` if the id or public code is taken.
    async fn insert(&self, queue: &Queue) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Queue>>;

    async fn find_by_code(&self, code: &PublicCode) -> Result<Option<Queue>>;

    async fn code_in_use(&self, code: &PublicCode) -> Result<bool>;

    /// Linearizable read-modify-write of one queue.
    ///
    /// Errors: `NotFound` if the queue does not exist, `Domain` if the
    /// mutator rejects the state, `Database` on storage failure.
    async fn atomic_update(&self, id: &str, mutator: &mut Mutator<'_>) -> Result<UpdateOutcome>;

    /// Remove the queue. Returns false if it was already gone.
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Queue>>;

    async fn list_by_member(&self, member_id: &str) -> Result<Vec<Queue>>;

    /// Started, not-on-break queues whose no-show lock is due at `now`
    async fn find_lock_expired(&self, now: i64) -> Result<Vec<Queue>>;

    /// Queues on break whose break end is due at `now`
    async fn find_break_expired(&self, now: i64) -> Result<Vec<Queue>>;
}

/// Shared commit check for adapters: `next` must be a legal successor of `current`
pub fn check_commit(current: &Queue, next: &Queue) -> Result<()> {
    current.ensure_successor(next).map_err(AppError::from)
}

/// Run a mutator against `current` and validate what it returns
pub fn apply_mutator(current: &Queue, mutator: &mut Mutator<'_>) -> Result<Option<Queue>> {
    match mutator(current)? {
        Mutation::Commit(next) => {
            check_commit(current, &next)?;
            Ok(Some(next))
        }
        Mutation::Noop => Ok(None),
    }
}

/// Stable listing order: oldest first, id as tie-breaker
pub fn sort_queues(queues: &mut [Queue]) {
    queues.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id().cmp(b.id()))
    });
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard};

    /// Process-local store. The mutex is held across the mutator call, which
    /// makes every update on the map linearizable.
    #[derive(Default)]
    pub struct InMemoryQueueStore {
        queues: Mutex<HashMap<String, Queue>>,
    }

    impl InMemoryQueueStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Queue>>> {
            self.queues
                .lock()
                .map_err(|_| AppError::Internal("queue store mutex poisoned".into()))
        }

        fn collect<F>(&self, filter: F) -> Result<Vec<Queue>>
        where
            F: Fn(&Queue) -> bool,
        {
            let mut found: Vec<Queue> = self.lock()?.values().filter(|q| filter(q)).cloned().collect();
            sort_queues(&mut found);
            Ok(found)
        }
    }

    #[async_trait]
    impl QueueStore for InMemoryQueueStore {
        async fn insert(&self, queue: &Queue) -> Result<()> {
            queue.validate()?;
            let mut queues = self.lock()?;
            if queues.contains_key(queue.id()) {
                return Err(AppError::Conflict(format!("queue id {} exists", queue.id())));
            }
            if queues.values().any(|q| q.public_code() == queue.public_code()) {
                return Err(AppError::Conflict(format!(
                    "public code {} in use",
                    queue.public_code()
                )));
            }
            queues.insert(queue.id().to_string(), queue.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<Queue>> {
            Ok(self.lock()?.get(id).cloned())
        }

        async fn find_by_code(&self, code: &PublicCode) -> Result<Option<Queue>> {
            Ok(self
                .lock()?
                .values()
                .find(|q| q.public_code() == code)
                .cloned())
        }

        async fn code_in_use(&self, code: &PublicCode) -> Result<bool> {
            Ok(self.lock()?.values().any(|q| q.public_code() == code))
        }

        async fn atomic_update(&self, id: &str, mutator: &mut Mutator<'_>) -> Result<UpdateOutcome> {
            let mut queues = self.lock()?;
            let current = queues.get(id).ok_or_else(|| AppError::queue_not_found(id))?;

            match apply_mutator(current, mutator)? {
                Some(next) => {
                    queues.insert(id.to_string(), next.clone());
                    Ok(UpdateOutcome::Updated(next))
                }
                None => Ok(UpdateOutcome::ConflictNoop(current.clone())),
            }
        }

        async fn delete(&self, id: &str) -> Result<bool> {
            Ok(self.lock()?.remove(id).is_some())
        }

        async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Queue>> {
            self.collect(|q| q.owner_id() == owner_id)
        }

        async fn list_by_member(&self, member_id: &str) -> Result<Vec<Queue>> {
            self.collect(|q| q.contains(member_id))
        }

        async fn find_lock_expired(&self, now: i64) -> Result<Vec<Queue>> {
            self.collect(|q| q.expired_lock(now).is_some())
        }

        async fn find_break_expired(&self, now: i64) -> Result<Vec<Queue>> {
            self.collect(|q| q.expired_break(now).is_some())
        }
    }
}
