//! # PostgreSQL Store
//!
//! [`PgStore`] implements [`JobStore`] over a `sqlx` connection pool. Each
//! table has a submodule of free async functions taking `&PgPool`; the
//! trait impl only delegates.
//!
//! ## Row Mapping
//!
//! Enum columns are stored as their wire names. A row whose column no
//! longer parses is reported as [`StoreError::CorruptRow`], never coerced
//! to a default: a terminal job read back as QUEUED would reopen it.

pub mod agents;
pub mod anchors;
pub mod certificates;
pub mod deliveries;
pub mod jobs;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tw_core::{AgentId, AssetId, CertificateId, DeliveryId, JobId, PartnerId, UserId};
use tw_state::{
    Agent, AgentStatus, AgentSummary, Asset, BlockchainRecord, Certificate, Delivery, JobStatus,
    Partner, User, WipeJob, WipeResult,
};

use crate::error::StoreError;
use crate::repository::{CertificateFilter, JobFilter, JobStore, Page};

/// Connect to PostgreSQL and apply the embedded migrations.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;

    tracing::info!("Database migrations applied");

    Ok(pool)
}

/// Parse a wire-name column, reporting the row as corrupt on failure.
pub(crate) fn parse_column<T>(
    table: &'static str,
    id: impl ToString,
    value: &str,
) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| {
        let id = id.to_string();
        tracing::error!(table, row = %id, error = %e, "unparseable enum column");
        StoreError::CorruptRow {
            table,
            id,
            reason: e.to_string(),
        }
    })
}

/// Decode a JSONB column, reporting the row as corrupt on failure.
pub(crate) fn decode_json<T: DeserializeOwned>(
    table: &'static str,
    id: impl ToString,
    value: serde_json::Value,
) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| {
        let id = id.to_string();
        tracing::error!(table, row = %id, error = %e, "undecodable JSON column");
        StoreError::CorruptRow {
            table,
            id,
            reason: e.to_string(),
        }
    })
}

/// PostgreSQL-backed [`JobStore`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an initialized pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, shared with the task queue and audit sink.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        agents::insert_user(&self.pool, user).await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        agents::get_user(&self.pool, id).await
    }

    async fn insert_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        agents::insert_agent(&self.pool, agent).await
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>, StoreError> {
        agents::get_agent(&self.pool, id).await
    }

    async fn list_agents(&self) -> Result<Vec<AgentSummary>, StoreError> {
        agents::list_agents(&self.pool).await
    }

    async fn set_agent_status(
        &self,
        id: AgentId,
        status: AgentStatus,
    ) -> Result<Agent, StoreError> {
        agents::set_agent_status(&self.pool, id, status).await
    }

    async fn touch_agent(&self, id: AgentId, now: DateTime<Utc>) -> Result<(), StoreError> {
        agents::touch_agent(&self.pool, id, now).await
    }

    async fn get_asset(&self, id: AssetId) -> Result<Option<Asset>, StoreError> {
        agents::get_asset(&self.pool, id).await
    }

    async fn insert_job(
        &self,
        job: &WipeJob,
        new_asset: Option<&Asset>,
    ) -> Result<(), StoreError> {
        let Some(asset) = new_asset else {
            return jobs::insert(&self.pool, job).await;
        };
        let mut tx = self.pool.begin().await?;
        agents::insert_asset(&mut *tx, asset).await?;
        jobs::insert(&mut *tx, job).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<WipeJob>, StoreError> {
        jobs::get_by_id(&self.pool, id).await
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Page<WipeJob>, StoreError> {
        jobs::list(&self.pool, filter).await
    }

    async fn claim_next_job(
        &self,
        agent: AgentId,
        now: DateTime<Utc>,
    ) -> Result<Option<WipeJob>, StoreError> {
        jobs::claim_next(&self.pool, agent, now).await
    }

    async fn update_job(&self, job: &WipeJob, expected: JobStatus) -> Result<(), StoreError> {
        jobs::compare_and_update(&self.pool, job, expected).await
    }

    async fn insert_result(
        &self,
        result: &WipeResult,
        certificate: &Certificate,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        certificates::insert_result(&mut *tx, result).await?;
        certificates::insert(&mut *tx, certificate).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_result_for_job(&self, job_id: JobId) -> Result<Option<WipeResult>, StoreError> {
        certificates::get_result_for_job(&self.pool, job_id).await
    }

    async fn insert_certificate(&self, cert: &Certificate) -> Result<(), StoreError> {
        certificates::insert(&self.pool, cert).await
    }

    async fn get_certificate(&self, id: CertificateId) -> Result<Option<Certificate>, StoreError> {
        certificates::get_by_id(&self.pool, id).await
    }

    async fn list_certificates(
        &self,
        filter: &CertificateFilter,
    ) -> Result<Vec<Certificate>, StoreError> {
        certificates::list(&self.pool, filter).await
    }

    async fn upsert_anchor(&self, record: &BlockchainRecord) -> Result<(), StoreError> {
        anchors::upsert(&self.pool, record).await
    }

    async fn delete_anchor(&self, job_id: JobId) -> Result<(), StoreError> {
        anchors::delete(&self.pool, job_id).await
    }

    async fn get_anchor(&self, job_id: JobId) -> Result<Option<BlockchainRecord>, StoreError> {
        anchors::get_by_job(&self.pool, job_id).await
    }

    async fn find_anchor_by_tx(
        &self,
        tx_hash: &str,
    ) -> Result<Option<BlockchainRecord>, StoreError> {
        anchors::get_by_tx(&self.pool, tx_hash).await
    }

    async fn insert_partner(&self, partner: &Partner) -> Result<(), StoreError> {
        deliveries::insert_partner(&self.pool, partner).await
    }

    async fn get_partner(&self, id: PartnerId) -> Result<Option<Partner>, StoreError> {
        deliveries::get_partner(&self.pool, id).await
    }

    async fn insert_delivery(&self, delivery: &Delivery) -> Result<(), StoreError> {
        deliveries::insert(&self.pool, delivery).await
    }

    async fn get_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>, StoreError> {
        deliveries::get_by_id(&self.pool, id).await
    }

    async fn save_delivery(&self, delivery: &Delivery) -> Result<(), StoreError> {
        deliveries::update(&self.pool, delivery).await
    }
}
