//! Wipe job persistence.
//!
//! The policy snapshot is written once by [`insert`] and never appears in
//! an UPDATE statement.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use tw_core::{AgentId, AssetId, JobId, UserId};
use tw_state::{JobStatus, WipeJob};
use uuid::Uuid;

use super::{decode_json, parse_column};
use crate::error::StoreError;
use crate::repository::{JobFilter, Page};

const TABLE: &str = "wipe_jobs";

const COLUMNS: &str = "id, asset_id, scope, target, nist_category, method, requested_by, \
     assigned_agent_id, status, policy_snapshot, progress, last_error, run_log_sha256, \
     claimed_at, created_at, started_at, finished_at, updated_at";

/// Insert a new job with its frozen policy snapshot.
pub async fn insert<'e>(executor: impl PgExecutor<'e>, job: &WipeJob) -> Result<(), StoreError> {
    let snapshot = serde_json::to_value(&job.policy_snapshot)?;

    sqlx::query(
        "INSERT INTO wipe_jobs (id, asset_id, scope, target, nist_category, method, requested_by,
             assigned_agent_id, status, policy_snapshot, progress, last_error, run_log_sha256,
             claimed_at, created_at, started_at, finished_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
    )
    .bind(job.id.as_uuid())
    .bind(job.asset_id.map(|a| *a.as_uuid()))
    .bind(job.scope.as_str())
    .bind(&job.target)
    .bind(job.nist_category.as_str())
    .bind(job.method.as_str())
    .bind(job.requested_by.as_uuid())
    .bind(job.assigned_agent_id.map(|a| *a.as_uuid()))
    .bind(job.status.as_str())
    .bind(&snapshot)
    .bind(job.progress.map(i16::from))
    .bind(&job.last_error)
    .bind(&job.run_log_sha256)
    .bind(job.claimed_at)
    .bind(job.created_at)
    .bind(job.started_at)
    .bind(job.finished_at)
    .bind(job.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Fetch a job by ID.
pub async fn get_by_id(pool: &PgPool, id: JobId) -> Result<Option<WipeJob>, StoreError> {
    let sql = format!("SELECT {COLUMNS} FROM wipe_jobs WHERE id = $1");
    let row = sqlx::query_as::<_, JobRow>(&sql)
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await?;

    row.map(JobRow::into_record).transpose()
}

/// Newest-first page of jobs matching `filter`.
pub async fn list(pool: &PgPool, filter: &JobFilter) -> Result<Page<WipeJob>, StoreError> {
    const WHERE: &str = "($1::text IS NULL OR status = $1) \
         AND ($2::uuid IS NULL OR assigned_agent_id = $2)";

    let status = filter.status.map(|s| s.as_str());
    let agent = filter.assigned_agent_id.map(|a| *a.as_uuid());
    let limit = filter.effective_limit();

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM wipe_jobs WHERE {WHERE}"))
        .bind(status)
        .bind(agent)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "SELECT {COLUMNS} FROM wipe_jobs WHERE {WHERE}
         ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
    );
    let rows = sqlx::query_as::<_, JobRow>(&sql)
        .bind(status)
        .bind(agent)
        .bind(i64::from(limit))
        .bind(i64::from(filter.offset))
        .fetch_all(pool)
        .await?;

    Ok(Page {
        items: rows
            .into_iter()
            .map(JobRow::into_record)
            .collect::<Result<_, _>>()?,
        total: u64::try_from(total).unwrap_or(0),
        limit,
        offset: filter.offset,
    })
}

/// Claim the oldest unclaimed QUEUED job of `agent` in one statement.
///
/// `FOR UPDATE SKIP LOCKED` makes a concurrent claimer skip the row this
/// statement holds, so it sees either the next eligible job or none.
pub async fn claim_next(
    pool: &PgPool,
    agent: AgentId,
    now: DateTime<Utc>,
) -> Result<Option<WipeJob>, StoreError> {
    let sql = format!(
        "UPDATE wipe_jobs SET claimed_at = $2, updated_at = $2
         WHERE id = (
             SELECT id FROM wipe_jobs
             WHERE assigned_agent_id = $1 AND status = 'QUEUED' AND claimed_at IS NULL
             ORDER BY created_at, id
             LIMIT 1
             FOR UPDATE SKIP LOCKED
         )
         RETURNING {COLUMNS}"
    );
    let row = sqlx::query_as::<_, JobRow>(&sql)
        .bind(agent.as_uuid())
        .bind(now)
        .fetch_optional(pool)
        .await?;

    row.map(JobRow::into_record).transpose()
}

/// Write the mutable columns of `job` if the stored status is `expected`.
pub async fn compare_and_update(
    pool: &PgPool,
    job: &WipeJob,
    expected: JobStatus,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE wipe_jobs SET status = $2, progress = $3, last_error = $4, run_log_sha256 = $5,
             claimed_at = $6, started_at = $7, finished_at = $8, updated_at = $9
         WHERE id = $1 AND status = $10",
    )
    .bind(job.id.as_uuid())
    .bind(job.status.as_str())
    .bind(job.progress.map(i16::from))
    .bind(&job.last_error)
    .bind(&job.run_log_sha256)
    .bind(job.claimed_at)
    .bind(job.started_at)
    .bind(job.finished_at)
    .bind(job.updated_at)
    .bind(expected.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    let current: Option<String> = sqlx::query_scalar("SELECT status FROM wipe_jobs WHERE id = $1")
        .bind(job.id.as_uuid())
        .fetch_optional(pool)
        .await?;

    match current {
        None => Err(StoreError::not_found("job", job.id)),
        Some(status) => Err(StoreError::conflict(format!(
            "job {} is {status} (expected {expected})",
            job.id
        ))),
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    asset_id: Option<Uuid>,
    scope: String,
    target: String,
    nist_category: String,
    method: String,
    requested_by: Uuid,
    assigned_agent_id: Option<Uuid>,
    status: String,
    policy_snapshot: serde_json::Value,
    progress: Option<i16>,
    last_error: Option<String>,
    run_log_sha256: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn into_record(self) -> Result<WipeJob, StoreError> {
        let id = self.id;
        let progress = self
            .progress
            .map(|p| {
                u8::try_from(p).map_err(|e| StoreError::CorruptRow {
                    table: TABLE,
                    id: id.to_string(),
                    reason: format!("progress {p}: {e}"),
                })
            })
            .transpose()?;

        Ok(WipeJob {
            id: JobId::from_uuid(id),
            asset_id: self.asset_id.map(AssetId::from_uuid),
            scope: parse_column(TABLE, id, &self.scope)?,
            target: self.target,
            nist_category: parse_column(TABLE, id, &self.nist_category)?,
            method: parse_column(TABLE, id, &self.method)?,
            requested_by: UserId::from_uuid(self.requested_by),
            assigned_agent_id: self.assigned_agent_id.map(AgentId::from_uuid),
            status: parse_column(TABLE, id, &self.status)?,
            policy_snapshot: decode_json(TABLE, id, self.policy_snapshot)?,
            progress,
            last_error: self.last_error,
            run_log_sha256: self.run_log_sha256,
            claimed_at: self.claimed_at,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            updated_at: self.updated_at,
        })
    }
}
