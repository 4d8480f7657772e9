//! QueueTrackr Daemon - Main Entry Point
//!
//! Wires the SQLite adapters into the engine, serves JSON-RPC, and runs the
//! auto-advance and break-expiry sweeps and the observer ledger purge until
//! Ctrl+C.

mod config;
mod logging;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use config::DaemonConfig;
use queuetrackr_api_rpc::RpcServer;
use queuetrackr_core::application::sweeper::constants::SHUTDOWN_GRACE_PERIOD;
use queuetrackr_core::application::{shutdown_channel, EngineDeps, QueueEngine};
use queuetrackr_core::port::{RandomCodeGenerator, SystemTimeProvider, UuidProvider};
use queuetrackr_infra_sqlite::{
    create_pool, run_migrations, schema_version, SqliteObserverLedger, SqliteQueueStore,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let config = DaemonConfig::load().context("Failed to load configuration")?;
    let _log_guard = logging::init(config.log_format, config.log_dir.as_deref())?;

    info!(version = VERSION, "QueueTrackr daemon starting");

    // 2. Database
    if let Some(dir) = config.db_dir() {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    info!(db_path = %config.db_path, "Initializing database");

    let pool = create_pool(&config.database_url())
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;
    info!(schema_version = schema_version(&pool).await?, "Database ready");

    // 3. Engine (DI wiring)
    let engine = Arc::new(QueueEngine::new(
        EngineDeps {
            store: Arc::new(SqliteQueueStore::new(pool.clone())),
            ledger: Arc::new(SqliteObserverLedger::new(pool.clone())),
            time_provider: Arc::new(SystemTimeProvider),
            id_provider: Arc::new(UuidProvider),
            code_generator: Arc::new(RandomCodeGenerator),
        },
        config.engine_config(),
    ));

    // 4. JSON-RPC server
    let (rpc_addr, rpc_handle) = RpcServer::new(config.rpc_server_config(), Arc::clone(&engine))
        .start()
        .await
        .context("RPC server start failed")?;

    // 5. Sweeps
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let advance_sweeper = engine.advance_sweeper(config.sweep_interval());
    let token = shutdown_tx.token();
    let advance_handle = tokio::spawn(async move { advance_sweeper.run(token).await });

    let break_sweeper = engine.break_sweeper(config.sweep_interval());
    let token = shutdown_tx.token();
    let break_handle = tokio::spawn(async move { break_sweeper.run(token).await });

    let maintenance = engine.ledger_maintenance(config.ledger_purge_interval());
    let maintenance_handle = tokio::spawn(async move { maintenance.run(shutdown_rx).await });

    info!(
        rpc_addr = %rpc_addr,
        sweep_interval_ms = config.sweep_interval_ms,
        leave_policy = ?config.leave_policy,
        "System ready. Press Ctrl+C to shutdown"
    );

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown
    shutdown_tx.shutdown();
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }

    let sweeps = async {
        for (name, handle) in [
            ("advance", advance_handle),
            ("break", break_handle),
            ("ledger", maintenance_handle),
        ] {
            if let Err(e) = handle.await {
                error!(sweep = name, error = %e, "Sweep task failed");
            }
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, sweeps).await.is_err() {
        warn!(
            grace_ms = SHUTDOWN_GRACE_PERIOD.as_millis() as u64,
            "Sweeps did not stop within the grace period"
        );
    }

    rpc_handle.stopped().await;
    pool.close().await;

    info!("Shutdown complete.");
    Ok(())
}
