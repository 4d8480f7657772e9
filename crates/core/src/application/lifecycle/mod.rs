// Queue Lifecycle Service - create, look up, end

pub mod create;

pub use create::{CreateQueueRequest, MAX_CODE_ATTEMPTS};

use super::feed::{FeedItem, StateFeed};
use crate::domain::{PublicCode, Queue};
use crate::error::{AppError, Result};
use crate::port::{CodeGenerator, IdProvider, QueueStore, TimeProvider};
use std::sync::Arc;
use tracing::info;

pub struct QueueLifecycle {
    store: Arc<dyn QueueStore>,
    id_provider: Arc<dyn IdProvider>,
    code_generator: Arc<dyn CodeGenerator>,
    time_provider: Arc<dyn TimeProvider>,
    feed: StateFeed,
}

impl QueueLifecycle {
    pub fn new(
        store: Arc<dyn QueueStore>,
        id_provider: Arc<dyn IdProvider>,
        code_generator: Arc<dyn CodeGenerator>,
        time_provider: Arc<dyn TimeProvider>,
        feed: StateFeed,
    ) -> Self {
        Self {
            store,
            id_provider,
            code_generator,
            time_provider,
            feed,
        }
    }

    /// Create a new queue with a unique public code
    pub async fn create_queue(&self, req: CreateQueueRequest) -> Result<Queue> {
        let queue = create::execute(
            self.store.as_ref(),
            self.id_provider.as_ref(),
            self.code_generator.as_ref(),
            self.time_provider.as_ref(),
            req,
        )
        .await?;
        self.feed.publish(FeedItem::Updated(queue.clone()));
        Ok(queue)
    }

    /// Delete the queue. Terminal: later operations on the id fail `NotFound`.
    pub async fn end_queue(&self, queue_id: &str, actor: &str) -> Result<()> {
        let queue = self.get_queue(queue_id).await?;
        queue.ensure_owner(actor)?;

        if !self.store.delete(queue_id).await? {
            return Err(AppError::queue_not_found(queue_id));
        }

        info!(queue_id = %queue_id, served = queue.current_index(), "Queue ended");
        self.feed.publish(FeedItem::Ended(queue_id.to_string()));
        Ok(())
    }

    pub async fn get_queue(&self, queue_id: &str) -> Result<Queue> {
        self.store
            .find_by_id(queue_id)
            .await?
            .ok_or_else(|| AppError::queue_not_found(queue_id))
    }

    /// Resolve a user-typed public code
    pub async fn find_by_code(&self, code: &str) -> Result<Queue> {
        let code = PublicCode::parse(code)?;
        self.store
            .find_by_code(&code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("queue code {}", code)))
    }

    pub async fn list_owned(&self, owner_id: &str) -> Result<Vec<Queue>> {
        self.store.list_by_owner(owner_id).await
    }

    pub async fn list_joined(&self, member_id: &str) -> Result<Vec<Queue>> {
        self.store.list_by_member(member_id).await
    }
}
