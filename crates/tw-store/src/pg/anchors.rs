//! Blockchain anchor record persistence.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tw_core::JobId;
use tw_state::BlockchainRecord;
use uuid::Uuid;

use super::parse_column;
use crate::error::StoreError;

const COLUMNS: &str =
    "job_id, cert_hash, status, tx_hash, block_number, last_error, created_at, updated_at";

/// Insert the record of a job, or replace every mutable column of it.
pub async fn upsert(pool: &PgPool, record: &BlockchainRecord) -> Result<(), StoreError> {
    let block_number = record
        .block_number
        .map(i64::try_from)
        .transpose()
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        "INSERT INTO blockchain_records
             (job_id, cert_hash, status, tx_hash, block_number, last_error, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (job_id) DO UPDATE SET
             cert_hash = EXCLUDED.cert_hash,
             status = EXCLUDED.status,
             tx_hash = EXCLUDED.tx_hash,
             block_number = EXCLUDED.block_number,
             last_error = EXCLUDED.last_error,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(record.job_id.as_uuid())
    .bind(&record.cert_hash)
    .bind(record.status.as_str())
    .bind(&record.tx_hash)
    .bind(block_number)
    .bind(&record.last_error)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Remove the record of `job_id`.
pub async fn delete(pool: &PgPool, job_id: JobId) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM blockchain_records WHERE job_id = $1")
        .bind(job_id.as_uuid())
        .execute(pool)
        .await?;
    Ok(())
}

/// The record of `job_id`.
pub async fn get_by_job(
    pool: &PgPool,
    job_id: JobId,
) -> Result<Option<BlockchainRecord>, StoreError> {
    let sql = format!("SELECT {COLUMNS} FROM blockchain_records WHERE job_id = $1");
    let row = sqlx::query_as::<_, AnchorRow>(&sql)
        .bind(job_id.as_uuid())
        .fetch_optional(pool)
        .await?;

    row.map(AnchorRow::into_record).transpose()
}

/// The record carrying `tx_hash` (case-insensitive).
pub async fn get_by_tx(
    pool: &PgPool,
    tx_hash: &str,
) -> Result<Option<BlockchainRecord>, StoreError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM blockchain_records WHERE lower(tx_hash) = lower($1) LIMIT 1"
    );
    let row = sqlx::query_as::<_, AnchorRow>(&sql)
        .bind(tx_hash)
        .fetch_optional(pool)
        .await?;

    row.map(AnchorRow::into_record).transpose()
}

#[derive(sqlx::FromRow)]
struct AnchorRow {
    job_id: Uuid,
    cert_hash: String,
    status: String,
    tx_hash: Option<String>,
    block_number: Option<i64>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AnchorRow {
    fn into_record(self) -> Result<BlockchainRecord, StoreError> {
        const TABLE: &str = "blockchain_records";
        let id = self.job_id;
        let block_number = self
            .block_number
            .map(|n| {
                u64::try_from(n).map_err(|e| StoreError::CorruptRow {
                    table: TABLE,
                    id: id.to_string(),
                    reason: format!("block number {n}: {e}"),
                })
            })
            .transpose()?;

        Ok(BlockchainRecord {
            job_id: JobId::from_uuid(id),
            cert_hash: self.cert_hash,
            status: parse_column(TABLE, id, &self.status)?,
            tx_hash: self.tx_hash,
            block_number,
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
