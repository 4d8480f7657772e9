//! Daemon configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then
//! `QUEUETRACKR_*` environment variables.

use config::{Config, Environment, File, FileFormat, Map};
use queuetrackr_api_rpc::RpcServerConfig;
use queuetrackr_core::application::EngineConfig;
use queuetrackr_core::domain::LeavePolicy;
use queuetrackr_core::error::{AppError, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "QUEUETRACKR";
const CONFIG_PATH_VAR: &str = "QUEUETRACKR_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "~/.queuetrackr/config.toml";
const DEFAULT_DB_PATH: &str = "~/.queuetrackr/queues.db";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9630;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;
const DEFAULT_IN_FLIGHT_RELEASE_MS: u64 = 300;
const DEFAULT_LEDGER_RETENTION_MS: u64 = 60 * 60 * 1000;
const DEFAULT_LEDGER_PURGE_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    pub db_path: String,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub log_format: LogFormat,
    /// Directory for a daily-rolled JSON log file, in addition to stdout
    #[serde(default)]
    pub log_dir: Option<String>,
    pub sweep_interval_ms: u64,
    pub in_flight_release_ms: u64,
    /// How long an ended queue's observers can still poll for the removal
    pub ledger_retention_ms: u64,
    pub ledger_purge_interval_ms: u64,
    pub leave_policy: LeavePolicy,
}

impl DaemonConfig {
    /// Load from `$QUEUETRACKR_CONFIG` (or the default path) and the process environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from(&expand(&path), None)
    }

    /// Load with an explicit file and, when given, a replacement environment map
    pub fn load_from(file: &str, env: Option<Map<String, String>>) -> Result<Self> {
        let settings = Config::builder()
            .set_default("db_path", DEFAULT_DB_PATH)
            .and_then(|b| b.set_default("rpc_host", DEFAULT_RPC_HOST))
            .and_then(|b| b.set_default("rpc_port", i64::from(DEFAULT_RPC_PORT)))
            .and_then(|b| b.set_default("log_format", "pretty"))
            .and_then(|b| b.set_default("sweep_interval_ms", DEFAULT_SWEEP_INTERVAL_MS))
            .and_then(|b| b.set_default("in_flight_release_ms", DEFAULT_IN_FLIGHT_RELEASE_MS))
            .and_then(|b| b.set_default("ledger_retention_ms", DEFAULT_LEDGER_RETENTION_MS))
            .and_then(|b| {
                b.set_default("ledger_purge_interval_ms", DEFAULT_LEDGER_PURGE_INTERVAL_MS)
            })
            .and_then(|b| b.set_default("leave_policy", "preserve_rank"))
            .map_err(config_error)?
            .add_source(File::new(file, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .map_err(config_error)?;

        let mut config: DaemonConfig = settings.try_deserialize().map_err(config_error)?;
        config.db_path = expand(&config.db_path);
        config.log_dir = config.log_dir.as_deref().map(expand);
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.db_path.trim().is_empty() {
            return Err(AppError::Config("db_path cannot be empty".into()));
        }
        if self.sweep_interval_ms == 0 {
            return Err(AppError::Config("sweep_interval_ms must be positive".into()));
        }
        if self.ledger_purge_interval_ms == 0 {
            return Err(AppError::Config(
                "ledger_purge_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// sqlx URL for `db_path`; values already in URL form pass through
    pub fn database_url(&self) -> String {
        if self.db_path.starts_with("sqlite:") {
            self.db_path.clone()
        } else {
            format!("sqlite://{}", self.db_path)
        }
    }

    /// Parent directory of a file database, if it has one
    pub fn db_dir(&self) -> Option<PathBuf> {
        if self.db_path.starts_with("sqlite:") {
            return None;
        }
        PathBuf::from(&self.db_path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn ledger_purge_interval(&self) -> Duration {
        Duration::from_millis(self.ledger_purge_interval_ms)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            leave_policy: self.leave_policy,
            in_flight_release: Duration::from_millis(self.in_flight_release_ms),
            ledger_retention: Duration::from_millis(self.ledger_retention_ms),
        }
    }

    pub fn rpc_server_config(&self) -> RpcServerConfig {
        RpcServerConfig {
            host: self.rpc_host.clone(),
            port: self.rpc_port,
        }
    }
}

fn expand(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

fn config_error(err: config::ConfigError) -> AppError {
    AppError::Config(err.to_string())
}
