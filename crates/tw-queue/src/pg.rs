//! PostgreSQL [`TaskQueue`] over the `task_queue` table.
//!
//! Claims use `FOR UPDATE SKIP LOCKED`, so any number of worker processes
//! can share one queue. Settling re-checks the claim token inside the
//! UPDATE's WHERE clause.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tw_core::TaskId;
use uuid::Uuid;

use crate::envelope::{FailureOutcome, QueueName, TaskEnvelope, TaskStatus, LEASE_EXPIRED_ERROR};
use crate::error::QueueError;
use crate::queue::TaskQueue;

const COLUMNS: &str = "id, queue, payload, status, attempts, max_attempts, base_delay_ms, \
     run_at, lease_until, last_error, created_at, updated_at";

/// Queue persisted in PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgQueue {
    pool: PgPool,
}

impl PgQueue {
    /// Use the `task_queue` table behind `pool`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn lease_end(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn to_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

#[async_trait]
impl TaskQueue for PgQueue {
    async fn ping(&self) -> Result<(), QueueError> {
        sqlx::query("SELECT 1 FROM task_queue LIMIT 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn enqueue(&self, task: &TaskEnvelope) -> Result<(), QueueError> {
        let payload = serde_json::to_value(&task.payload)?;
        sqlx::query(
            "INSERT INTO task_queue (id, queue, payload, status, attempts, max_attempts,
                 base_delay_ms, run_at, lease_until, last_error, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(task.id.as_uuid())
        .bind(task.queue.as_str())
        .bind(&payload)
        .bind(task.status.as_str())
        .bind(to_i32(task.attempts))
        .bind(to_i32(task.max_attempts))
        .bind(i64::try_from(task.base_delay_ms).unwrap_or(i64::MAX))
        .bind(task.run_at)
        .bind(task.lease_until)
        .bind(&task.last_error)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim(
        &self,
        queue: QueueName,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<TaskEnvelope>, QueueError> {
        let sql = format!(
            "UPDATE task_queue
             SET status = 'RUNNING', attempts = attempts + 1, lease_until = $3, updated_at = $2
             WHERE id = (
                 SELECT id FROM task_queue
                 WHERE queue = $1
                   AND attempts < max_attempts
                   AND ((status = 'PENDING' AND run_at <= $2)
                        OR (status = 'RUNNING' AND (lease_until IS NULL OR lease_until < $2)))
                 ORDER BY run_at, created_at, id
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(queue.as_str())
            .bind(now)
            .bind(lease_end(now, lease))
            .fetch_optional(&self.pool)
            .await?;

        row.map(TaskRow::into_envelope).transpose()
    }

    async fn complete(&self, task: &TaskEnvelope, now: DateTime<Utc>) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE task_queue SET status = 'COMPLETED', lease_until = NULL, updated_at = $3
             WHERE id = $1 AND status = 'RUNNING' AND attempts = $2",
        )
        .bind(task.id.as_uuid())
        .bind(to_i32(task.attempts))
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(())
        } else {
            Err(self.settle_error(task).await)
        }
    }

    async fn fail(
        &self,
        task: &TaskEnvelope,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(TaskEnvelope, FailureOutcome), QueueError> {
        let mut next = task.clone();
        let outcome = next.record_failure(error, now);

        let result = sqlx::query(
            "UPDATE task_queue
             SET status = $3, run_at = $4, lease_until = NULL, last_error = $5, updated_at = $6
             WHERE id = $1 AND status = 'RUNNING' AND attempts = $2",
        )
        .bind(task.id.as_uuid())
        .bind(to_i32(task.attempts))
        .bind(next.status.as_str())
        .bind(next.run_at)
        .bind(&next.last_error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok((next, outcome))
        } else {
            Err(self.settle_error(task).await)
        }
    }

    async fn reap_abandoned(
        &self,
        queue: QueueName,
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskEnvelope>, QueueError> {
        let sql = format!(
            "UPDATE task_queue
             SET status = 'EXHAUSTED', lease_until = NULL, last_error = $3, updated_at = $2
             WHERE queue = $1 AND status = 'RUNNING' AND attempts >= max_attempts
               AND (lease_until IS NULL OR lease_until < $2)
             RETURNING {COLUMNS}"
        );
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(queue.as_str())
            .bind(now)
            .bind(LEASE_EXPIRED_ERROR)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TaskRow::into_envelope).collect()
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskEnvelope>, QueueError> {
        let sql = format!("SELECT {COLUMNS} FROM task_queue WHERE id = $1");
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TaskRow::into_envelope).transpose()
    }
}

impl PgQueue {
    /// Explain why settling `task` matched no row.
    async fn settle_error(&self, task: &TaskEnvelope) -> QueueError {
        match self.get(task.id).await {
            Ok(Some(_)) => QueueError::LeaseLost {
                id: task.id,
                attempt: task.attempts,
            },
            Ok(None) => QueueError::NotFound { id: task.id },
            Err(e) => e,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    queue: String,
    payload: serde_json::Value,
    status: String,
    attempts: i32,
    max_attempts: i32,
    base_delay_ms: i64,
    run_at: DateTime<Utc>,
    lease_until: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_envelope(self) -> Result<TaskEnvelope, QueueError> {
        let id = self.id;
        let corrupt = |reason: String| {
            tracing::error!(task_id = %id, %reason, "undecodable task row");
            QueueError::Corrupt {
                id: id.to_string(),
                reason,
            }
        };

        let queue: QueueName = self.queue.parse().map_err(|e| corrupt(format!("{e}")))?;
        let status: TaskStatus = self.status.parse().map_err(|e| corrupt(format!("{e}")))?;
        let payload = serde_json::from_value(self.payload)
            .map_err(|e| corrupt(format!("payload: {e}")))?;

        Ok(TaskEnvelope {
            id: TaskId::from_uuid(id),
            queue,
            payload,
            status,
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            max_attempts: u32::try_from(self.max_attempts).unwrap_or(0),
            base_delay_ms: u64::try_from(self.base_delay_ms).unwrap_or(0),
            run_at: self.run_at,
            lease_until: self.lease_until,
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
