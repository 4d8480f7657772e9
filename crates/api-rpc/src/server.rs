//! JSON-RPC Server
//!
//! Serves JSON-RPC 2.0 over TCP, bound to localhost.

use crate::error::RpcError;
use crate::handler::RpcHandler;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::RpcModule;
use queuetrackr_core::application::QueueEngine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9630;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: RpcHandler,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, engine: Arc<QueueEngine>) -> Self {
        Self {
            config,
            handler: RpcHandler::new(engine),
        }
    }

    /// Bind and start serving. Port 0 picks a free port; the bound address
    /// is returned alongside the handle.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), RpcError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|source| RpcError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = server.local_addr().map_err(|source| RpcError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let mut module = RpcModule::new(self.handler);

        // Queue lifecycle and queries
        register(&mut module, "queue.create.v1", |h, req| async move {
            h.create_queue(req).await
        })?;
        register(&mut module, "queue.get.v1", |h, req| async move {
            h.get_queue(req).await
        })?;
        register(&mut module, "queue.find_by_code.v1", |h, req| async move {
            h.find_by_code(req).await
        })?;
        register(&mut module, "queue.list_owned.v1", |h, req| async move {
            h.list_owned(req).await
        })?;
        register(&mut module, "queue.list_joined.v1", |h, req| async move {
            h.list_joined(req).await
        })?;
        register(&mut module, "queue.end.v1", |h, req| async move {
            h.end_queue(req).await
        })?;

        // Members
        register(&mut module, "member.join.v1", |h, req| async move {
            h.join(req).await
        })?;
        register(&mut module, "member.leave.v1", |h, req| async move {
            h.leave(req).await
        })?;
        register(&mut module, "member.status.v1", |h, req| async move {
            h.status(req).await
        })?;
        register(&mut module, "member.events.v1", |h, req| async move {
            h.events(req).await
        })?;

        // Serving
        register(&mut module, "advance.start.v1", |h, req| async move {
            h.start_queue(req).await
        })?;
        register(&mut module, "advance.next.v1", |h, req| async move {
            h.move_next(req).await
        })?;
        register(&mut module, "advance.proceed.v1", |h, req| async move {
            h.proceed_now(req).await
        })?;

        // Breaks
        register(&mut module, "break.start.v1", |h, req| async move {
            h.start_break(req).await
        })?;
        register(&mut module, "break.extend.v1", |h, req| async move {
            h.extend_break(req).await
        })?;
        register(&mut module, "break.end.v1", |h, req| async move {
            h.end_break(req).await
        })?;

        info!(
            addr = %local_addr,
            methods = module.method_names().count(),
            "JSON-RPC server started (localhost only)"
        );

        Ok((local_addr, server.start(module)))
    }
}

/// Register one method: parse params as `P`, call the handler, return `R`
fn register<P, R, F, Fut>(
    module: &mut RpcModule<RpcHandler>,
    method: &'static str,
    call: F,
) -> Result<(), RpcError>
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Clone + Send + 'static,
    F: Fn(Arc<RpcHandler>, P) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ErrorObjectOwned>> + Send + 'static,
{
    module
        .register_async_method(method, move |params, handler, _| {
            let call = call.clone();
            async move {
                let req: P = params.parse()?;
                call(handler, req).await
            }
        })
        .map_err(|e| RpcError::Register {
            method,
            reason: e.to_string(),
        })?;
    Ok(())
}
