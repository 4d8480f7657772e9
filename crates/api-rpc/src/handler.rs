//! RPC Method Handlers
//!
//! Thin translation between wire types and `QueueEngine` calls.

use crate::error::to_rpc_error;
use crate::types::{
    BreakRequest, CommandResponse, CreateQueueRequest, EndQueueResponse, EventsResponse,
    FindByCodeRequest, GetQueueRequest, JoinRequest, ListJoinedRequest, ListOwnedRequest,
    MemberRequest, OwnerCommandRequest, QueueListResponse, QueueResponse, StatusResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use queuetrackr_core::application::{self, Applied, QueueEngine};
use queuetrackr_core::error::AppError;
use std::sync::Arc;
use tracing::debug;

type RpcResult<T> = Result<T, ErrorObjectOwned>;

/// RPC Handler over a shared engine
pub struct RpcHandler {
    engine: Arc<QueueEngine>,
}

impl RpcHandler {
    pub fn new(engine: Arc<QueueEngine>) -> Self {
        Self { engine }
    }

    /// queue.create.v1
    pub async fn create_queue(&self, params: CreateQueueRequest) -> RpcResult<QueueResponse> {
        let queue = self
            .engine
            .create_queue(application::CreateQueueRequest {
                name: params.name,
                owner_id: params.owner_id,
            })
            .await
            .map_err(to_rpc_error)?;
        Ok(QueueResponse { queue })
    }

    /// queue.get.v1
    pub async fn get_queue(&self, params: GetQueueRequest) -> RpcResult<QueueResponse> {
        let queue = self
            .engine
            .get_queue(&params.queue_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(QueueResponse { queue })
    }

    /// queue.find_by_code.v1
    pub async fn find_by_code(&self, params: FindByCodeRequest) -> RpcResult<QueueResponse> {
        let queue = self
            .engine
            .find_by_code(&params.code)
            .await
            .map_err(to_rpc_error)?;
        Ok(QueueResponse { queue })
    }

    /// queue.list_owned.v1
    pub async fn list_owned(&self, params: ListOwnedRequest) -> RpcResult<QueueListResponse> {
        let queues = self
            .engine
            .list_owned(&params.owner_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(QueueListResponse { queues })
    }

    /// queue.list_joined.v1
    pub async fn list_joined(&self, params: ListJoinedRequest) -> RpcResult<QueueListResponse> {
        let queues = self
            .engine
            .list_joined(&params.member_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(QueueListResponse { queues })
    }

    /// queue.end.v1
    pub async fn end_queue(&self, params: OwnerCommandRequest) -> RpcResult<EndQueueResponse> {
        self.engine
            .end_queue(&params.queue_id, &params.actor)
            .await
            .map_err(to_rpc_error)?;
        Ok(EndQueueResponse {
            queue_id: params.queue_id,
            ended: true,
        })
    }

    /// member.join.v1
    pub async fn join(&self, params: JoinRequest) -> RpcResult<QueueResponse> {
        let queue = match (params.queue_id.as_deref(), params.code.as_deref()) {
            (Some(queue_id), None) => self.engine.join(queue_id, &params.member_id).await,
            (None, Some(code)) => self.engine.join_by_code(code, &params.member_id).await,
            _ => Err(AppError::Validation(
                "exactly one of queue_id or code is required".to_string(),
            )),
        }
        .map_err(to_rpc_error)?;
        Ok(QueueResponse { queue })
    }

    /// member.leave.v1
    pub async fn leave(&self, params: MemberRequest) -> RpcResult<CommandResponse> {
        let applied = self
            .engine
            .leave(&params.queue_id, &params.member_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(command_response(applied))
    }

    /// member.status.v1
    pub async fn status(&self, params: MemberRequest) -> RpcResult<StatusResponse> {
        let position = self
            .engine
            .member_status(&params.queue_id, &params.member_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(StatusResponse {
            is_turn: position.is_turn(),
            position,
        })
    }

    /// member.events.v1
    pub async fn events(&self, params: MemberRequest) -> RpcResult<EventsResponse> {
        let events = self
            .engine
            .poll_events(&params.queue_id, &params.member_id)
            .await
            .map_err(to_rpc_error)?;
        debug!(
            queue_id = %params.queue_id,
            member_id = %params.member_id,
            count = events.len(),
            "Polled member events"
        );
        Ok(EventsResponse { events })
    }

    /// advance.start.v1
    pub async fn start_queue(&self, params: OwnerCommandRequest) -> RpcResult<CommandResponse> {
        let applied = self
            .engine
            .start_queue(&params.queue_id, &params.actor)
            .await
            .map_err(to_rpc_error)?;
        Ok(command_response(applied))
    }

    /// advance.next.v1
    pub async fn move_next(&self, params: OwnerCommandRequest) -> RpcResult<CommandResponse> {
        let queue = self
            .engine
            .move_next(&params.queue_id, &params.actor)
            .await
            .map_err(to_rpc_error)?;
        Ok(CommandResponse {
            changed: true,
            queue,
        })
    }

    /// advance.proceed.v1
    pub async fn proceed_now(&self, params: OwnerCommandRequest) -> RpcResult<CommandResponse> {
        let applied = self
            .engine
            .proceed_now(&params.queue_id, &params.actor)
            .await
            .map_err(to_rpc_error)?;
        Ok(command_response(applied))
    }

    /// break.start.v1
    pub async fn start_break(&self, params: BreakRequest) -> RpcResult<QueueResponse> {
        let queue = self
            .engine
            .start_break(&params.queue_id, &params.actor, params.minutes)
            .await
            .map_err(to_rpc_error)?;
        Ok(QueueResponse { queue })
    }

    /// break.extend.v1
    pub async fn extend_break(&self, params: BreakRequest) -> RpcResult<QueueResponse> {
        let queue = self
            .engine
            .extend_break(&params.queue_id, &params.actor, params.minutes)
            .await
            .map_err(to_rpc_error)?;
        Ok(QueueResponse { queue })
    }

    /// break.end.v1
    pub async fn end_break(&self, params: OwnerCommandRequest) -> RpcResult<CommandResponse> {
        let applied = self
            .engine
            .end_break(&params.queue_id, &params.actor)
            .await
            .map_err(to_rpc_error)?;
        Ok(command_response(applied))
    }
}

fn command_response(applied: Applied) -> CommandResponse {
    CommandResponse {
        changed: applied.is_changed(),
        queue: applied.into_queue(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;
    use queuetrackr_core::application::{EngineConfig, EngineDeps};
    use queuetrackr_core::port::code_generator::mocks::ScriptedCodes;
    use queuetrackr_core::port::id_provider::mocks::SequentialIds;
    use queuetrackr_core::port::observer_ledger::memory::InMemoryObserverLedger;
    use queuetrackr_core::port::queue_store::memory::InMemoryQueueStore;
    use queuetrackr_core::port::time_provider::mocks::ManualClock;

    fn handler() -> RpcHandler {
        let engine = QueueEngine::new(
            EngineDeps {
                store: Arc::new(InMemoryQueueStore::new()),
                ledger: Arc::new(InMemoryObserverLedger::new()),
                time_provider: Arc::new(ManualClock::new(1_000_000)),
                id_provider: Arc::new(SequentialIds::new("q")),
                code_generator: Arc::new(ScriptedCodes::new(&["Q1234"])),
            },
            EngineConfig::default(),
        );
        RpcHandler::new(Arc::new(engine))
    }

    async fn create(handler: &RpcHandler) -> String {
        handler
            .create_queue(CreateQueueRequest {
                name: "Bakery".into(),
                owner_id: "owner".into(),
            })
            .await
            .unwrap()
            .queue
            .id()
            .to_string()
    }

    #[tokio::test]
    async fn test_join_by_code_then_status() {
        let handler = handler();
        let queue_id = create(&handler).await;

        let joined = handler
            .join(JoinRequest {
                queue_id: None,
                code: Some("q1234".into()),
                member_id: "alice".into(),
            })
            .await
            .unwrap();
        assert_eq!(joined.queue.id(), queue_id);

        handler
            .start_queue(OwnerCommandRequest {
                queue_id: queue_id.clone(),
                actor: "owner".into(),
            })
            .await
            .unwrap();

        let status = handler
            .status(MemberRequest {
                queue_id,
                member_id: "alice".into(),
            })
            .await
            .unwrap();
        assert!(status.is_turn);
        assert_eq!(status.position.positions_ahead, 0);
    }

    #[tokio::test]
    async fn test_join_requires_exactly_one_target() {
        let handler = handler();
        let err = handler
            .join(JoinRequest {
                queue_id: None,
                code: None,
                member_id: "alice".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::VALIDATION_ERROR);
    }

    #[tokio::test]
    async fn test_foreign_actor_is_forbidden() {
        let handler = handler();
        let queue_id = create(&handler).await;

        let err = handler
            .start_queue(OwnerCommandRequest {
                queue_id,
                actor: "mallory".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_repeated_start_is_unchanged() {
        let handler = handler();
        let queue_id = create(&handler).await;
        let command = || OwnerCommandRequest {
            queue_id: queue_id.clone(),
            actor: "owner".into(),
        };

        assert!(handler.start_queue(command()).await.unwrap().changed);
        assert!(!handler.start_queue(command()).await.unwrap().changed);
    }
}
