// SQLite ObserverLedger Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use queuetrackr_core::domain::Observation;
use queuetrackr_core::error::{AppError, Result};
use queuetrackr_core::port::ObserverLedger;
use sqlx::SqlitePool;

pub struct SqliteObserverLedger {
    pool: SqlitePool,
}

impl SqliteObserverLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
#[sqlx(rename_all = "camelCase")]
struct ObservationRow {
    positions_ahead: i64,
    member_index: i64,
    served: bool,
    turn: bool,
}

impl TryFrom<ObservationRow> for Observation {
    type Error = AppError;

    fn try_from(row: ObservationRow) -> Result<Self> {
        let to_index = |label: &str, value: i64| {
            usize::try_from(value)
                .map_err(|_| AppError::Database(format!("negative {} in ledger: {}", label, value)))
        };
        Ok(Observation {
            positions_ahead: to_index("positionsAhead", row.positions_ahead)?,
            member_index: to_index("memberIndex", row.member_index)?,
            served: row.served,
            turn: row.turn,
        })
    }
}

#[async_trait]
impl ObserverLedger for SqliteObserverLedger {
    async fn load(&self, queue_id: &str, member_id: &str) -> Result<Option<Observation>> {
        let row = sqlx::query_as::<_, ObservationRow>(
            r#"
            SELECT positionsAhead, memberIndex, served, turn
            FROM observer_positions
            WHERE queueId = ? AND memberId = ?
            "#,
        )
        .bind(queue_id)
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(Observation::try_from).transpose()
    }

    async fn compare_and_store(
        &self,
        queue_id: &str,
        member_id: &str,
        expected: Option<&Observation>,
        next: &Observation,
    ) -> Result<bool> {
        let result = match expected {
            None => sqlx::query(
                r#"
                INSERT INTO observer_positions (queueId, memberId, positionsAhead, memberIndex, served, turn)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(queueId, memberId) DO NOTHING
                "#,
            )
            .bind(queue_id)
            .bind(member_id)
            .bind(next.positions_ahead as i64)
            .bind(next.member_index as i64)
            .bind(next.served)
            .bind(next.turn),
            Some(expected) => sqlx::query(
                r#"
                UPDATE observer_positions
                SET positionsAhead = ?, memberIndex = ?, served = ?, turn = ?
                WHERE queueId = ? AND memberId = ?
                  AND positionsAhead = ? AND memberIndex = ? AND served = ? AND turn = ?
                "#,
            )
            .bind(next.positions_ahead as i64)
            .bind(next.member_index as i64)
            .bind(next.served)
            .bind(next.turn)
            .bind(queue_id)
            .bind(member_id)
            .bind(expected.positions_ahead as i64)
            .bind(expected.member_index as i64)
            .bind(expected.served)
            .bind(expected.turn),
        }
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn compare_and_forget(
        &self,
        queue_id: &str,
        member_id: &str,
        expected: &Observation,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM observer_positions
            WHERE queueId = ? AND memberId = ?
              AND positionsAhead = ? AND memberIndex = ? AND served = ? AND turn = ?
            "#,
        )
        .bind(queue_id)
        .bind(member_id)
        .bind(expected.positions_ahead as i64)
        .bind(expected.member_index as i64)
        .bind(expected.served)
        .bind(expected.turn)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn retire_queue(&self, queue_id: &str, ended_at: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE observer_positions SET endedAt = ? WHERE queueId = ? AND endedAt IS NULL",
        )
        .bind(ended_at)
        .bind(queue_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn purge_retired(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM observer_positions WHERE endedAt IS NOT NULL AND endedAt <= ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
