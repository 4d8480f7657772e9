// Create Queue Use Case

use crate::domain::Queue;
use crate::error::{AppError, Result};
use crate::port::{CodeGenerator, IdProvider, QueueStore, TimeProvider};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Attempts at finding an unused public code before giving up
pub const MAX_CODE_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQueueRequest {
    pub name: String,
    pub owner_id: String,
}

/// Validate the request before any store access
pub fn validate_request(req: &CreateQueueRequest) -> Result<String> {
    if req.owner_id.trim().is_empty() {
        return Err(AppError::Validation("Owner id cannot be empty".into()));
    }
    Ok(Queue::validate_name(&req.name)?)
}

/// Execute create use case
///
/// # Arguments
///
/// * `store` - Queue store (uniqueness of the public code is enforced here)
/// * `ids` - ID generator (injected for determinism)
/// * `codes` - Public code source
/// * `time_provider` - Time provider (injected for determinism)
/// * `req` - Create request
pub async fn execute(
    store: &dyn QueueStore,
    ids: &dyn IdProvider,
    codes: &dyn CodeGenerator,
    time_provider: &dyn TimeProvider,
    req: CreateQueueRequest,
) -> Result<Queue> {
    let name = validate_request(&req)?;
    let created_at = time_provider.now_millis();

    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = codes.next_code()?;
        if store.code_in_use(&code).await? {
            debug!(attempt, code = %code, "Public code in use, drawing another");
            continue;
        }

        let queue = Queue::create(ids.generate_id(), code, &name, &req.owner_id, created_at)?;

        // a concurrent create can still take the code between check and insert
        match store.insert(&queue).await {
            Ok(()) => {
                info!(
                    queue_id = %queue.id(),
                    code = %queue.public_code(),
                    owner_id = %queue.owner_id(),
                    attempt,
                    "Queue created"
                );
                return Ok(queue);
            }
            Err(AppError::Conflict(reason)) => {
                debug!(attempt, reason = %reason, "Insert lost a uniqueness race, retrying");
            }
            Err(e) => return Err(e),
        }
    }

    warn!(attempts = MAX_CODE_ATTEMPTS, "No free public code found");
    Err(AppError::CodeExhausted {
        attempts: MAX_CODE_ATTEMPTS,
    })
}
