//! RPC Error Types
//!
//! Maps application errors to stable JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use queuetrackr_core::domain::DomainError;
use queuetrackr_core::error::AppError;
use serde_json::json;
use thiserror::Error;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const FORBIDDEN: i32 = 4003;
    pub const PRECONDITION_FAILED: i32 = 4009;
    pub const CODE_EXHAUSTED: i32 = 4010;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const DB_ERROR: i32 = 5001;
}

/// Failures while bringing the server up
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Failed to bind RPC server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to register method {method}: {reason}")]
    Register { method: &'static str, reason: String },
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    match err {
        AppError::Domain(e) => domain_error(e),
        AppError::Validation(msg) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, msg, None::<()>)
        }
        AppError::NotFound(msg) => ErrorObjectOwned::owned(code::NOT_FOUND, msg, None::<()>),
        AppError::Conflict(msg) => ErrorObjectOwned::owned(code::CONFLICT, msg, None::<()>),
        e @ AppError::CodeExhausted { .. } => {
            ErrorObjectOwned::owned(code::CODE_EXHAUSTED, e.to_string(), None::<()>)
        }
        AppError::Database(msg) => ErrorObjectOwned::owned(code::DB_ERROR, msg, None::<()>),
        e @ (AppError::Serialization(_)
        | AppError::Io(_)
        | AppError::Config(_)
        | AppError::Internal(_)) => {
            ErrorObjectOwned::owned(code::INTERNAL_ERROR, e.to_string(), None::<()>)
        }
    }
}

fn domain_error(err: DomainError) -> ErrorObjectOwned {
    let message = err.to_string();
    match err {
        DomainError::Validation(_) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, message, None::<()>)
        }
        DomainError::NotAMember { member_id } => ErrorObjectOwned::owned(
            code::NOT_FOUND,
            message,
            Some(json!({ "member_id": member_id })),
        ),
        DomainError::AlreadyJoined { member_id } => ErrorObjectOwned::owned(
            code::CONFLICT,
            message,
            Some(json!({ "member_id": member_id })),
        ),
        DomainError::NotOwner { .. } => {
            ErrorObjectOwned::owned(code::FORBIDDEN, message, None::<()>)
        }
        DomainError::Locked { until } => ErrorObjectOwned::owned(
            code::PRECONDITION_FAILED,
            message,
            Some(json!({ "reason": "locked", "until": until })),
        ),
        DomainError::OnBreak { ends_at } => ErrorObjectOwned::owned(
            code::PRECONDITION_FAILED,
            message,
            Some(json!({ "reason": "on_break", "ends_at": ends_at })),
        ),
        DomainError::AlreadyOnBreak { ends_at } => ErrorObjectOwned::owned(
            code::PRECONDITION_FAILED,
            message,
            Some(json!({ "reason": "already_on_break", "ends_at": ends_at })),
        ),
        DomainError::NotOnBreak => precondition(message, "not_on_break"),
        DomainError::NotStarted => precondition(message, "not_started"),
        DomainError::NothingToServe => precondition(message, "nothing_to_serve"),
        DomainError::InvalidRecord(_) => {
            ErrorObjectOwned::owned(code::INTERNAL_ERROR, message, None::<()>)
        }
    }
}

fn precondition(message: String, reason: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(
        code::PRECONDITION_FAILED,
        message,
        Some(json!({ "reason": reason })),
    )
}
