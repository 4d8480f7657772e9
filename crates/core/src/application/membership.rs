// Membership Manager - join and leave

use super::applied::{apply, Applied};
use super::feed::StateFeed;
use crate::domain::error::Result as DomainResult;
use crate::domain::{LeavePolicy, PublicCode, Queue};
use crate::error::{AppError, Result};
use crate::port::{Mutation, QueueStore};
use std::sync::Arc;
use tracing::info;

pub struct MembershipManager {
    store: Arc<dyn QueueStore>,
    feed: StateFeed,
    leave_policy: LeavePolicy,
}

impl MembershipManager {
    pub fn new(store: Arc<dyn QueueStore>, feed: StateFeed, leave_policy: LeavePolicy) -> Self {
        Self {
            store,
            feed,
            leave_policy,
        }
    }

    /// Append `member_id` to the queue. Fails `AlreadyJoined` on a repeat.
    pub async fn join(&self, queue_id: &str, member_id: &str) -> Result<Queue> {
        let mut mutator = |q: &Queue| -> DomainResult<Mutation> {
            let mut next = q.clone();
            next.join(member_id)?;
            Ok(Mutation::Commit(next))
        };
        let queue = apply(self.store.as_ref(), &self.feed, queue_id, &mut mutator)
            .await?
            .into_queue();

        info!(
            queue_id = %queue_id,
            member_id = %member_id,
            position = queue.len() - 1,
            "Member joined"
        );
        Ok(queue)
    }

    /// Join through the shareable code
    pub async fn join_by_code(&self, code: &str, member_id: &str) -> Result<Queue> {
        let code = PublicCode::parse(code)?;
        let queue = self
            .store
            .find_by_code(&code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("queue code {}", code)))?;
        self.join(queue.id(), member_id).await
    }

    /// Remove `member_id`, applying the configured leave policy to the pointer
    pub async fn leave(&self, queue_id: &str, member_id: &str) -> Result<Applied> {
        let policy = self.leave_policy;
        let mut effect = None;
        let mut mutator = |q: &Queue| -> DomainResult<Mutation> {
            let mut next = q.clone();
            effect = Some(next.leave(member_id, policy)?);
            Ok(Mutation::Commit(next))
        };
        let applied = apply(self.store.as_ref(), &self.feed, queue_id, &mut mutator).await?;

        if let Some(effect) = effect {
            info!(
                queue_id = %queue_id,
                member_id = %member_id,
                removed_index = effect.removed_index,
                pointer_shifted = effect.pointer_shifted,
                lock_cleared = effect.lock_cleared,
                "Member left"
            );
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use crate::port::queue_store::memory::InMemoryQueueStore;

    async fn setup(policy: LeavePolicy) -> (MembershipManager, Arc<InMemoryQueueStore>) {
        let store = Arc::new(InMemoryQueueStore::new());
        let queue =
            Queue::create("q-1", PublicCode::parse("Q1234").unwrap(), "Desk", "owner", 0).unwrap();
        store.insert(&queue).await.unwrap();
        let manager = MembershipManager::new(store.clone(), StateFeed::default(), policy);
        (manager, store)
    }

    #[tokio::test]
    async fn test_join_twice_keeps_size() {
        let (manager, store) = setup(LeavePolicy::PreserveRank).await;
        manager.join("q-1", "alice").await.unwrap();

        let err = manager.join("q-1", "alice").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::AlreadyJoined { .. })
        ));
        assert_eq!(store.find_by_id("q-1").await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_join_by_code_accepts_lowercase() {
        let (manager, _) = setup(LeavePolicy::PreserveRank).await;
        let queue = manager.join_by_code(" q1234 ", "bob").await.unwrap();
        assert_eq!(queue.members(), ["bob".to_string()]);
    }

    #[tokio::test]
    async fn test_join_by_code_errors() {
        let (manager, _) = setup(LeavePolicy::PreserveRank).await;
        assert!(manager.join_by_code("", "bob").await.unwrap_err().is_validation());
        assert!(matches!(
            manager.join_by_code("Q9999", "bob").await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_join_unknown_queue() {
        let (manager, _) = setup(LeavePolicy::PreserveRank).await;
        assert!(matches!(
            manager.join("missing", "bob").await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_leave_policies_differ_for_served_members() {
        for (policy, expected_index) in [(LeavePolicy::PreserveRank, 1), (LeavePolicy::KeepIndex, 2)] {
            let (manager, store) = setup(policy).await;
            for m in ["a", "b", "c"] {
                manager.join("q-1", m).await.unwrap();
            }
            store
                .atomic_update("q-1", &mut |q: &Queue| -> DomainResult<Mutation> {
                    let mut next = q.clone();
                    next.start(0);
                    next.advance(1)?;
                    next.clear_lock();
                    next.advance(2)?;
                    Ok(Mutation::Commit(next))
                })
                .await
                .unwrap();

            let applied = manager.leave("q-1", "a").await.unwrap();
            assert!(applied.is_changed());
            assert_eq!(applied.queue().current_index(), expected_index, "{:?}", policy);
        }
    }

    #[tokio::test]
    async fn test_leave_non_member() {
        let (manager, _) = setup(LeavePolicy::PreserveRank).await;
        assert!(matches!(
            manager.leave("q-1", "ghost").await.unwrap_err(),
            AppError::Domain(DomainError::NotAMember { .. })
        ));
    }
}
