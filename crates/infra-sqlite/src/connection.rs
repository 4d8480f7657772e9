// SQLite Connection Pool Setup

use crate::error::map_sqlx_error;
use queuetrackr_core::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Pool size for file databases
const MAX_FILE_CONNECTIONS: u32 = 10;

/// Create SQLite connection pool with WAL mode and a busy timeout.
///
/// In-memory URLs get a single connection: every SQLite connection to
/// `:memory:` opens its own private database.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(map_sqlx_error)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    let max_connections = if database_url.contains(":memory:") {
        1
    } else {
        MAX_FILE_CONNECTIONS
    };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)
}
