//! Result and certificate persistence.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use tw_core::{CertificateId, JobId, ResultId};
use tw_state::{Certificate, CertificateArtifacts, ResultArtifacts, WipeResult};
use uuid::Uuid;

use super::{decode_json, parse_column};
use crate::error::StoreError;
use crate::repository::CertificateFilter;

const CERT_COLUMNS: &str = "id, job_id, nist_category, payload, hash, status, ca_details, \
     chain_checked, verification_errors, pdf_ref, json_ref, pkcs7_ref, created_at";

// ─── Results ─────────────────────────────────────────────────────────

/// Insert the result of a job. The unique `job_id` rejects a second one.
pub async fn insert_result<'e>(
    executor: impl PgExecutor<'e>,
    result: &WipeResult,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO wipe_results (id, job_id, device_info, metrics, proof, pdf_ref, json_ref, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(result.id.as_uuid())
    .bind(result.job_id.as_uuid())
    .bind(&result.device_info)
    .bind(&result.metrics)
    .bind(&result.proof)
    .bind(&result.artifacts.pdf_ref)
    .bind(&result.artifacts.json_ref)
    .bind(result.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// The result ingested for `job_id`.
pub async fn get_result_for_job(
    pool: &PgPool,
    job_id: JobId,
) -> Result<Option<WipeResult>, StoreError> {
    let row = sqlx::query_as::<_, ResultRow>(
        "SELECT id, job_id, device_info, metrics, proof, pdf_ref, json_ref, created_at
         FROM wipe_results WHERE job_id = $1",
    )
    .bind(job_id.as_uuid())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(ResultRow::into_record))
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    id: Uuid,
    job_id: Uuid,
    device_info: serde_json::Value,
    metrics: serde_json::Value,
    proof: serde_json::Value,
    pdf_ref: Option<String>,
    json_ref: Option<String>,
    created_at: DateTime<Utc>,
}

impl ResultRow {
    fn into_record(self) -> WipeResult {
        WipeResult {
            id: ResultId::from_uuid(self.id),
            job_id: JobId::from_uuid(self.job_id),
            device_info: self.device_info,
            metrics: self.metrics,
            proof: self.proof,
            artifacts: ResultArtifacts {
                pdf_ref: self.pdf_ref,
                json_ref: self.json_ref,
            },
            created_at: self.created_at,
        }
    }
}

// ─── Certificates ────────────────────────────────────────────────────

/// Insert a certificate with its verification verdict.
pub async fn insert<'e>(
    executor: impl PgExecutor<'e>,
    cert: &Certificate,
) -> Result<(), StoreError> {
    let ca_details = cert
        .ca_details
        .as_ref()
        .map(serde_json::to_value)
        .transpose()?;
    let errors = serde_json::to_value(&cert.verification_errors)?;

    sqlx::query(
        "INSERT INTO certificates (id, job_id, nist_category, payload, hash, status, ca_details,
             chain_checked, verification_errors, pdf_ref, json_ref, pkcs7_ref, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(cert.id.as_uuid())
    .bind(cert.job_id.map(|j| *j.as_uuid()))
    .bind(cert.nist_category.map(|c| c.as_str()))
    .bind(&cert.payload)
    .bind(&cert.hash)
    .bind(cert.status.as_str())
    .bind(&ca_details)
    .bind(cert.chain_checked)
    .bind(&errors)
    .bind(&cert.artifacts.pdf_ref)
    .bind(&cert.artifacts.json_ref)
    .bind(&cert.artifacts.pkcs7_ref)
    .bind(cert.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Fetch a certificate by ID.
pub async fn get_by_id(
    pool: &PgPool,
    id: CertificateId,
) -> Result<Option<Certificate>, StoreError> {
    let sql = format!("SELECT {CERT_COLUMNS} FROM certificates WHERE id = $1");
    let row = sqlx::query_as::<_, CertificateRow>(&sql)
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await?;

    row.map(CertificateRow::into_record).transpose()
}

/// Certificates matching `filter`, newest first.
pub async fn list(
    pool: &PgPool,
    filter: &CertificateFilter,
) -> Result<Vec<Certificate>, StoreError> {
    let sql = format!(
        "SELECT {CERT_COLUMNS} FROM certificates
         WHERE ($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR job_id = $2)
         ORDER BY created_at DESC, id DESC"
    );
    let rows = sqlx::query_as::<_, CertificateRow>(&sql)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.job_id.map(|j| *j.as_uuid()))
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(CertificateRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct CertificateRow {
    id: Uuid,
    job_id: Option<Uuid>,
    nist_category: Option<String>,
    payload: serde_json::Value,
    hash: String,
    status: String,
    ca_details: Option<serde_json::Value>,
    chain_checked: bool,
    verification_errors: serde_json::Value,
    pdf_ref: Option<String>,
    json_ref: Option<String>,
    pkcs7_ref: Option<String>,
    created_at: DateTime<Utc>,
}

impl CertificateRow {
    fn into_record(self) -> Result<Certificate, StoreError> {
        const TABLE: &str = "certificates";
        let id = self.id;
        Ok(Certificate {
            id: CertificateId::from_uuid(id),
            job_id: self.job_id.map(JobId::from_uuid),
            nist_category: self
                .nist_category
                .as_deref()
                .map(|c| parse_column(TABLE, id, c))
                .transpose()?,
            payload: self.payload,
            hash: self.hash,
            status: parse_column(TABLE, id, &self.status)?,
            ca_details: self
                .ca_details
                .map(|v| decode_json(TABLE, id, v))
                .transpose()?,
            chain_checked: self.chain_checked,
            verification_errors: decode_json(TABLE, id, self.verification_errors)?,
            artifacts: CertificateArtifacts {
                pdf_ref: self.pdf_ref,
                json_ref: self.json_ref,
                pkcs7_ref: self.pkcs7_ref,
            },
            created_at: self.created_at,
        })
    }
}
