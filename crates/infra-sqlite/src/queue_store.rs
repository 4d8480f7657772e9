// SQLite QueueStore Implementation
//
// Atomic update is optimistic: read the row and its version, run the
// mutator, then `UPDATE ... WHERE id = ? AND version = ?`. A lost race
// re-reads and re-runs the mutator against the fresh state, so a stale
// precondition turns into a no-op instead of a merged write.

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use queuetrackr_core::domain::{PublicCode, Queue, QueueRecord};
use queuetrackr_core::error::{AppError, Result};
use queuetrackr_core::port::queue_store::apply_mutator;
use queuetrackr_core::port::{Mutator, QueueStore, UpdateOutcome};
use sqlx::SqlitePool;
use tracing::{debug, warn};

/// Re-reads allowed after losing a compare-and-swap race
pub const DEFAULT_CAS_RETRIES: u32 = 16;

const SELECT_QUEUE: &str = "SELECT id, publicCode, name, ownerId, createdAt, members, \
     currentIndex, hasStarted, isOnBreak, breakEndsAt, nextLockUntil, lastAdvanceAt, \
     avgServeMs, samples, version FROM queues";

pub struct SqliteQueueStore {
    pool: SqlitePool,
    cas_retries: u32,
}

impl SqliteQueueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_cas_retries(pool, DEFAULT_CAS_RETRIES)
    }

    pub fn with_cas_retries(pool: SqlitePool, cas_retries: u32) -> Self {
        Self { pool, cas_retries }
    }

    async fn load(&self, id: &str) -> Result<Option<(Queue, i64)>> {
        let row = sqlx::query_as::<_, QueueRow>(&format!("{} WHERE id = ?", SELECT_QUEUE))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(QueueRow::into_queue).transpose()
    }

    /// Run a listing query, skipping rows that no longer decode
    async fn list(&self, sql: &str, bind: ListBind<'_>) -> Result<Vec<Queue>> {
        let query = sqlx::query_as::<_, QueueRow>(sql);
        let query = match bind {
            ListBind::Text(value) => query.bind(value.to_string()),
            ListBind::Millis(value) => query.bind(value),
        };
        let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                match row.into_queue() {
                    Ok((queue, _)) => Some(queue),
                    Err(e) => {
                        warn!(queue_id = %id, error = %e, "Skipping undecodable queue row");
                        None
                    }
                }
            })
            .collect())
    }
}

enum ListBind<'a> {
    Text(&'a str),
    Millis(i64),
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn insert(&self, queue: &Queue) -> Result<()> {
        queue.validate()?;
        let record = QueueRecord::from(queue.clone());
        let members = serde_json::to_string(&record.members)?;

        sqlx::query(
            r#"
            INSERT INTO queues (
                id, publicCode, name, ownerId, createdAt, members,
                currentIndex, hasStarted, isOnBreak, breakEndsAt, nextLockUntil,
                lastAdvanceAt, avgServeMs, samples, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&record.id)
        .bind(&record.public_code)
        .bind(&record.name)
        .bind(&record.owner_id)
        .bind(record.created_at)
        .bind(&members)
        .bind(record.current_index as i64)
        .bind(record.has_started)
        .bind(record.is_on_break)
        .bind(record.break_ends_at)
        .bind(record.next_lock_until)
        .bind(record.last_advance_at)
        .bind(record.avg_serve_ms)
        .bind(record.samples)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Queue>> {
        Ok(self.load(id).await?.map(|(queue, _)| queue))
    }

    async fn find_by_code(&self, code: &PublicCode) -> Result<Option<Queue>> {
        let row = sqlx::query_as::<_, QueueRow>(&format!("{} WHERE publicCode = ?", SELECT_QUEUE))
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(QueueRow::into_queue).transpose()?.map(|(queue, _)| queue))
    }

    async fn code_in_use(&self, code: &PublicCode) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queues WHERE publicCode = ?")
            .bind(code.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count > 0)
    }

    async fn atomic_update(&self, id: &str, mutator: &mut Mutator<'_>) -> Result<UpdateOutcome> {
        for attempt in 0..=self.cas_retries {
            let (current, version) = self
                .load(id)
                .await?
                .ok_or_else(|| AppError::queue_not_found(id))?;

            let Some(next) = apply_mutator(&current, mutator)? else {
                return Ok(UpdateOutcome::ConflictNoop(current));
            };

            let record = QueueRecord::from(next.clone());
            let members = serde_json::to_string(&record.members)?;

            // Immutable columns are never written here
            let result = sqlx::query(
                r#"
                UPDATE queues
                SET members = ?, currentIndex = ?, hasStarted = ?, isOnBreak = ?,
                    breakEndsAt = ?, nextLockUntil = ?, lastAdvanceAt = ?,
                    avgServeMs = ?, samples = ?, version = version + 1
                WHERE id = ? AND version = ?
                "#,
            )
            .bind(&members)
            .bind(record.current_index as i64)
            .bind(record.has_started)
            .bind(record.is_on_break)
            .bind(record.break_ends_at)
            .bind(record.next_lock_until)
            .bind(record.last_advance_at)
            .bind(record.avg_serve_ms)
            .bind(record.samples)
            .bind(id)
            .bind(version)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            if result.rows_affected() == 1 {
                return Ok(UpdateOutcome::Updated(next));
            }

            debug!(queue_id = %id, attempt, version, "Lost compare-and-swap race, re-reading");
            tokio::task::yield_now().await;
        }

        Err(AppError::Database(format!(
            "queue {} still contended after {} attempts",
            id,
            self.cas_retries + 1
        )))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM queues WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Queue>> {
        self.list(
            &format!("{} WHERE ownerId = ? ORDER BY createdAt ASC, id ASC", SELECT_QUEUE),
            ListBind::Text(owner_id),
        )
        .await
    }

    async fn list_by_member(&self, member_id: &str) -> Result<Vec<Queue>> {
        self.list(
            &format!(
                "{} WHERE EXISTS (SELECT 1 FROM json_each(queues.members) WHERE json_each.value = ?) \
                 ORDER BY createdAt ASC, id ASC",
                SELECT_QUEUE
            ),
            ListBind::Text(member_id),
        )
        .await
    }

    async fn find_lock_expired(&self, now: i64) -> Result<Vec<Queue>> {
        self.list(
            &format!(
                "{} WHERE hasStarted = 1 AND isOnBreak = 0 \
                 AND nextLockUntil IS NOT NULL AND nextLockUntil <= ? \
                 ORDER BY nextLockUntil ASC, id ASC",
                SELECT_QUEUE
            ),
            ListBind::Millis(now),
        )
        .await
    }

    async fn find_break_expired(&self, now: i64) -> Result<Vec<Queue>> {
        self.list(
            &format!(
                "{} WHERE isOnBreak = 1 AND breakEndsAt IS NOT NULL AND breakEndsAt <= ? \
                 ORDER BY breakEndsAt ASC, id ASC",
                SELECT_QUEUE
            ),
            ListBind::Millis(now),
        )
        .await
    }
}

#[derive(Debug, sqlx::FromRow)]
#[sqlx(rename_all = "camelCase")]
struct QueueRow {
    id: String,
    public_code: String,
    name: String,
    owner_id: String,
    created_at: i64,
    members: String,
    current_index: i64,
    has_started: bool,
    is_on_break: bool,
    break_ends_at: Option<i64>,
    next_lock_until: Option<i64>,
    last_advance_at: Option<i64>,
    avg_serve_ms: i64,
    samples: i64,
    version: i64,
}

impl QueueRow {
    /// Decode and validate; returns the queue with its storage version
    fn into_queue(self) -> Result<(Queue, i64)> {
        let members: Vec<String> = serde_json::from_str(&self.members)?;
        let current_index = usize::try_from(self.current_index).map_err(|_| {
            AppError::Database(format!(
                "queue {} has negative currentIndex {}",
                self.id, self.current_index
            ))
        })?;

        let record = QueueRecord {
            id: self.id,
            public_code: self.public_code,
            name: self.name,
            owner_id: self.owner_id,
            created_at: self.created_at,
            members,
            current_index,
            has_started: self.has_started,
            is_on_break: self.is_on_break,
            break_ends_at: self.break_ends_at,
            next_lock_until: self.next_lock_until,
            last_advance_at: self.last_advance_at,
            avg_serve_ms: self.avg_serve_ms,
            samples: self.samples,
        };
        Ok((Queue::try_from(record)?, self.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use queuetrackr_core::domain::error::Result as DomainResult;
    use queuetrackr_core::domain::DomainError;
    use queuetrackr_core::port::Mutation;

    async fn setup_test_db() -> SqliteQueueStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteQueueStore::new(pool)
    }

    fn queue(id: &str, code: &str, created_at: i64) -> Queue {
        Queue::create(id, PublicCode::parse(code).unwrap(), "Front desk", "owner", created_at)
            .unwrap()
    }

    fn join(member: &'static str) -> impl FnMut(&Queue) -> DomainResult<Mutation> + Send {
        move |q: &Queue| {
            let mut next = q.clone();
            next.join(member)?;
            Ok(Mutation::Commit(next))
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = setup_test_db().await;
        let q = queue("q-1", "Q1234", 10);
        store.insert(&q).await.unwrap();

        assert_eq!(store.find_by_id("q-1").await.unwrap(), Some(q.clone()));
        let code = PublicCode::parse("Q1234").unwrap();
        assert_eq!(store.find_by_code(&code).await.unwrap(), Some(q));
        assert!(store.code_in_use(&code).await.unwrap());
        assert!(store.find_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_code_is_conflict() {
        let store = setup_test_db().await;
        store.insert(&queue("q-1", "Q1234", 10)).await.unwrap();
        let err = store.insert(&queue("q-2", "Q1234", 11)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_atomic_update_round_trips_every_field() {
        let store = setup_test_db().await;
        store.insert(&queue("q-1", "Q1234", 10)).await.unwrap();

        let outcome = store
            .atomic_update("q-1", &mut |q: &Queue| -> DomainResult<Mutation> {
                let mut next = q.clone();
                next.join("a")?;
                next.join("b")?;
                next.join("c")?;
                next.start(1_000);
                next.advance(91_000)?;
                Ok(Mutation::Commit(next))
            })
            .await
            .unwrap();
        assert!(outcome.is_updated());

        let stored = store.find_by_id("q-1").await.unwrap().unwrap();
        assert_eq!(&stored, outcome.queue());
        assert_eq!(stored.members().len(), 3);
        assert_eq!(stored.current_index(), 1);
        assert_eq!(stored.estimate().avg_serve_ms, 90_000);
        assert_eq!(stored.next_lock_until(), Some(91_000 + 120_000));
    }

    #[tokio::test]
    async fn test_noop_and_errors_leave_row_untouched() {
        let store = setup_test_db().await;
        store.insert(&queue("q-1", "Q1234", 10)).await.unwrap();
        store.atomic_update("q-1", &mut join("a")).await.unwrap();

        let err = store.atomic_update("q-1", &mut join("a")).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::AlreadyJoined { .. })
        ));

        let outcome = store
            .atomic_update("q-1", &mut |_: &Queue| -> DomainResult<Mutation> {
                Ok(Mutation::Noop)
            })
            .await
            .unwrap();
        assert!(matches!(outcome, UpdateOutcome::ConflictNoop(_)));
        assert_eq!(outcome.queue().len(), 1);

        let missing = store.atomic_update("gone", &mut join("a")).await.unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_by_member_uses_json_membership() {
        let store = setup_test_db().await;
        store.insert(&queue("q-1", "Q1001", 20)).await.unwrap();
        store.insert(&queue("q-2", "Q1002", 10)).await.unwrap();
        store.insert(&queue("q-3", "Q1003", 30)).await.unwrap();
        store.atomic_update("q-1", &mut join("alice")).await.unwrap();
        store.atomic_update("q-2", &mut join("alice")).await.unwrap();
        store.atomic_update("q-3", &mut join("alice-2")).await.unwrap();

        let ids: Vec<String> = store
            .list_by_member("alice")
            .await
            .unwrap()
            .iter()
            .map(|q| q.id().to_string())
            .collect();
        assert_eq!(ids, vec!["q-2", "q-1"]);
        assert_eq!(store.list_by_owner("owner").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_expiry_scans() {
        let store = setup_test_db().await;
        store.insert(&queue("q-1", "Q1001", 1)).await.unwrap();
        store.insert(&queue("q-2", "Q1002", 2)).await.unwrap();

        store
            .atomic_update("q-1", &mut |q: &Queue| -> DomainResult<Mutation> {
                let mut next = q.clone();
                next.join("a")?;
                next.join("b")?;
                next.start(0);
                next.advance(0)?;
                Ok(Mutation::Commit(next))
            })
            .await
            .unwrap();
        store
            .atomic_update("q-2", &mut |q: &Queue| -> DomainResult<Mutation> {
                let mut next = q.clone();
                next.start_break(2, 0)?;
                Ok(Mutation::Commit(next))
            })
            .await
            .unwrap();

        assert!(store.find_lock_expired(119_999).await.unwrap().is_empty());
        assert_eq!(store.find_lock_expired(120_000).await.unwrap().len(), 1);
        assert!(store.find_break_expired(119_999).await.unwrap().is_empty());
        assert_eq!(store.find_break_expired(120_000).await.unwrap()[0].id(), "q-2");
    }

    #[tokio::test]
    async fn test_concurrent_joins_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("cas.db").display());
        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = std::sync::Arc::new(SqliteQueueStore::new(pool));
        store.insert(&queue("q-1", "Q1234", 10)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let member = format!("m{}", i);
                store
                    .atomic_update("q-1", &mut |q: &Queue| -> DomainResult<Mutation> {
                        let mut next = q.clone();
                        next.join(&member)?;
                        Ok(Mutation::Commit(next))
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.find_by_id("q-1").await.unwrap().unwrap();
        assert_eq!(stored.len(), 8);
    }

    #[tokio::test]
    async fn test_delete_frees_code() {
        let store = setup_test_db().await;
        store.insert(&queue("q-1", "Q1234", 10)).await.unwrap();
        assert!(store.delete("q-1").await.unwrap());
        assert!(!store.delete("q-1").await.unwrap());
        store.insert(&queue("q-2", "Q1234", 11)).await.unwrap();
    }
}
