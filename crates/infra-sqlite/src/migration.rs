// Migration Runner

use crate::error::map_sqlx_error;
use queuetrackr_core::error::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Versioned migrations, applied in order
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (
        1,
        "Queue records",
        include_str!("../migrations/001_create_queues.sql"),
    ),
    (
        2,
        "Observer ledger",
        include_str!("../migrations/002_create_observer_positions.sql"),
    ),
    (
        3,
        "Observer ledger retention",
        include_str!("../migrations/003_observer_retention.sql"),
    ),
];

/// Highest applied migration, 0 for a fresh database
pub async fn schema_version(pool: &SqlitePool) -> Result<i64> {
    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
    )
    .fetch_one(pool)
    .await
    .map_err(map_sqlx_error)?;

    if table_exists == 0 {
        return Ok(0);
    }

    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(version.unwrap_or(0))
}

/// Run database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    let current_version = schema_version(pool).await?;
    info!("Current schema version: {}", current_version);

    for (version, description, sql) in MIGRATIONS {
        if *version > current_version {
            info!("Applying migration {:03}: {}", version, description);
            apply_migration(pool, sql).await?;
        }
    }

    info!("All migrations applied successfully");
    Ok(())
}

/// Apply one migration script inside a transaction
async fn apply_migration(pool: &SqlitePool, sql: &str) -> Result<()> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;
    for statement in statements(sql) {
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
    }
    tx.commit().await.map_err(map_sqlx_error)
}

/// Non-empty statements of a script, with `--` comment lines dropped
fn statements(sql: &str) -> impl Iterator<Item = String> + '_ {
    sql.split(';').filter_map(|chunk| {
        let body = chunk
            .lines()
            .filter(|line| !line.trim_start().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let body = body.trim();
        (!body.is_empty()).then(|| body.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_pool;

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queues")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(schema_version(&pool).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 3);
    }

    #[test]
    fn test_statements_skip_comments_and_blanks() {
        let script = "-- header\nCREATE TABLE a (x INTEGER);\n\n-- note\nCREATE INDEX i ON a(x);\n";
        let parsed: Vec<String> = statements(script).collect();
        assert_eq!(
            parsed,
            vec!["CREATE TABLE a (x INTEGER)", "CREATE INDEX i ON a(x)"]
        );
    }
}
