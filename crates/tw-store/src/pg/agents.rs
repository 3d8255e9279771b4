//! User, agent, and asset persistence.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use tw_core::{AgentId, AssetId, UserId};
use tw_state::{Agent, AgentStatus, AgentSummary, Asset, User};
use uuid::Uuid;

use super::parse_column;
use crate::error::StoreError;

const AGENT_COLUMNS: &str =
    "id, name, os, version, public_key, mtls_cert, status, last_seen, enrolled_at";

// ─── Users ───────────────────────────────────────────────────────────

/// Insert a user. The case-insensitive email index rejects duplicates.
pub async fn insert_user(pool: &PgPool, user: &User) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO users (id, email, role, created_at) VALUES ($1, $2, $3, $4)")
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(pool)
        .await?;
    Ok(())
}

/// Fetch a user by ID.
pub async fn get_user(pool: &PgPool, id: UserId) -> Result<Option<User>, StoreError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, role, created_at FROM users WHERE id = $1",
    )
    .bind(id.as_uuid())
    .fetch_optional(pool)
    .await?;

    row.map(UserRow::into_record).transpose()
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_record(self) -> Result<User, StoreError> {
        Ok(User {
            id: UserId::from_uuid(self.id),
            role: parse_column("users", self.id, &self.role)?,
            email: self.email,
            created_at: self.created_at,
        })
    }
}

// ─── Agents ──────────────────────────────────────────────────────────

/// Insert an agent. The unique `name` constraint rejects re-enrollment.
pub async fn insert_agent(pool: &PgPool, agent: &Agent) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO agents (id, name, os, version, public_key, mtls_cert, status, last_seen, enrolled_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(agent.id.as_uuid())
    .bind(&agent.name)
    .bind(&agent.os)
    .bind(&agent.version)
    .bind(&agent.public_key)
    .bind(&agent.mtls_cert)
    .bind(agent.status.as_str())
    .bind(agent.last_seen)
    .bind(agent.enrolled_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch an agent by ID.
pub async fn get_agent(pool: &PgPool, id: AgentId) -> Result<Option<Agent>, StoreError> {
    let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1");
    let row = sqlx::query_as::<_, AgentRow>(&sql)
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await?;

    row.map(AgentRow::into_record).transpose()
}

/// Every agent with its count of QUEUED and RUNNING jobs.
pub async fn list_agents(pool: &PgPool) -> Result<Vec<AgentSummary>, StoreError> {
    let rows = sqlx::query_as::<_, AgentSummaryRow>(
        "SELECT a.id, a.name, a.os, a.version, a.public_key, a.mtls_cert, a.status,
                a.last_seen, a.enrolled_at,
                COUNT(j.id) FILTER (WHERE j.status IN ('QUEUED', 'RUNNING')) AS active_jobs
         FROM agents a
         LEFT JOIN wipe_jobs j ON j.assigned_agent_id = a.id
         GROUP BY a.id
         ORDER BY a.enrolled_at, a.id",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let active_jobs = u64::try_from(row.active_jobs).unwrap_or(0);
            Ok(AgentSummary {
                agent: row.agent.into_record()?,
                active_jobs,
            })
        })
        .collect()
}

/// Replace an agent's status and return the updated agent.
pub async fn set_agent_status(
    pool: &PgPool,
    id: AgentId,
    status: AgentStatus,
) -> Result<Agent, StoreError> {
    let sql = format!("UPDATE agents SET status = $2 WHERE id = $1 RETURNING {AGENT_COLUMNS}");
    let row = sqlx::query_as::<_, AgentRow>(&sql)
        .bind(id.as_uuid())
        .bind(status.as_str())
        .fetch_optional(pool)
        .await?;

    row.ok_or_else(|| StoreError::not_found("agent", id))?
        .into_record()
}

/// Refresh an agent's last-seen timestamp.
pub async fn touch_agent(
    pool: &PgPool,
    id: AgentId,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE agents SET last_seen = $2 WHERE id = $1")
        .bind(id.as_uuid())
        .bind(now)
        .execute(pool)
        .await?;

    if result.rows_affected() > 0 {
        Ok(())
    } else {
        Err(StoreError::not_found("agent", id))
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: Uuid,
    name: String,
    os: String,
    version: String,
    public_key: Option<String>,
    mtls_cert: Option<String>,
    status: String,
    last_seen: Option<DateTime<Utc>>,
    enrolled_at: DateTime<Utc>,
}

impl AgentRow {
    fn into_record(self) -> Result<Agent, StoreError> {
        Ok(Agent {
            id: AgentId::from_uuid(self.id),
            status: parse_column("agents", self.id, &self.status)?,
            name: self.name,
            os: self.os,
            version: self.version,
            public_key: self.public_key,
            mtls_cert: self.mtls_cert,
            last_seen: self.last_seen,
            enrolled_at: self.enrolled_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AgentSummaryRow {
    #[sqlx(flatten)]
    agent: AgentRow,
    active_jobs: i64,
}

// ─── Assets ──────────────────────────────────────────────────────────

/// Insert an asset.
pub async fn insert_asset<'e>(
    executor: impl PgExecutor<'e>,
    asset: &Asset,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO assets (id, media_type, model, serial_number, capacity_bytes, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(asset.id.as_uuid())
    .bind(asset.media_type.as_str())
    .bind(&asset.model)
    .bind(&asset.serial_number)
    .bind(asset.capacity_bytes)
    .bind(asset.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Fetch an asset by ID.
pub async fn get_asset(pool: &PgPool, id: AssetId) -> Result<Option<Asset>, StoreError> {
    let row = sqlx::query_as::<_, AssetRow>(
        "SELECT id, media_type, model, serial_number, capacity_bytes, created_at
         FROM assets WHERE id = $1",
    )
    .bind(id.as_uuid())
    .fetch_optional(pool)
    .await?;

    row.map(AssetRow::into_record).transpose()
}

#[derive(sqlx::FromRow)]
struct AssetRow {
    id: Uuid,
    media_type: String,
    model: Option<String>,
    serial_number: Option<String>,
    capacity_bytes: Option<i64>,
    created_at: DateTime<Utc>,
}

impl AssetRow {
    fn into_record(self) -> Result<Asset, StoreError> {
        Ok(Asset {
            id: AssetId::from_uuid(self.id),
            media_type: parse_column("assets", self.id, &self.media_type)?,
            model: self.model,
            serial_number: self.serial_number,
            capacity_bytes: self.capacity_bytes,
            created_at: self.created_at,
        })
    }
}
