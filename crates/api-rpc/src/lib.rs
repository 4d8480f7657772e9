//! JSON-RPC API Layer
//!
//! Exposes every owner and member operation of the queue engine as a
//! JSON-RPC 2.0 method over localhost TCP.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use error::RpcError;
pub use server::{RpcServer, RpcServerConfig};
