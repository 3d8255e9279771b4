//! Partner and delivery persistence.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tw_core::{DeliveryId, JobId, PartnerId};
use tw_state::{Delivery, Partner};
use uuid::Uuid;

use super::parse_column;
use crate::error::StoreError;

// ─── Partners ────────────────────────────────────────────────────────

/// Insert a partner.
pub async fn insert_partner(pool: &PgPool, partner: &Partner) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO partners (id, name, webhook_url, contact_email, api_base, api_key, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(partner.id.as_uuid())
    .bind(&partner.name)
    .bind(&partner.webhook_url)
    .bind(&partner.contact_email)
    .bind(&partner.api_base)
    .bind(&partner.api_key)
    .bind(partner.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch a partner by ID.
pub async fn get_partner(pool: &PgPool, id: PartnerId) -> Result<Option<Partner>, StoreError> {
    let row = sqlx::query_as::<_, PartnerRow>(
        "SELECT id, name, webhook_url, contact_email, api_base, api_key, created_at
         FROM partners WHERE id = $1",
    )
    .bind(id.as_uuid())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(PartnerRow::into_record))
}

#[derive(sqlx::FromRow)]
struct PartnerRow {
    id: Uuid,
    name: String,
    webhook_url: Option<String>,
    contact_email: Option<String>,
    api_base: Option<String>,
    api_key: Option<String>,
    created_at: DateTime<Utc>,
}

impl PartnerRow {
    fn into_record(self) -> Partner {
        Partner {
            id: PartnerId::from_uuid(self.id),
            name: self.name,
            webhook_url: self.webhook_url,
            contact_email: self.contact_email,
            api_base: self.api_base,
            api_key: self.api_key,
            created_at: self.created_at,
        }
    }
}

// ─── Deliveries ──────────────────────────────────────────────────────

/// Insert a delivery.
pub async fn insert(pool: &PgPool, delivery: &Delivery) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO deliveries (id, job_id, partner_id, method, status, attempts, last_error,
             created_at, updated_at, delivered_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(delivery.id.as_uuid())
    .bind(delivery.job_id.as_uuid())
    .bind(delivery.partner_id.as_uuid())
    .bind(delivery.method.as_str())
    .bind(delivery.status.as_str())
    .bind(attempts_column(delivery.attempts))
    .bind(&delivery.last_error)
    .bind(delivery.created_at)
    .bind(delivery.updated_at)
    .bind(delivery.delivered_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch a delivery by ID.
pub async fn get_by_id(pool: &PgPool, id: DeliveryId) -> Result<Option<Delivery>, StoreError> {
    let row = sqlx::query_as::<_, DeliveryRow>(
        "SELECT id, job_id, partner_id, method, status, attempts, last_error,
                created_at, updated_at, delivered_at
         FROM deliveries WHERE id = $1",
    )
    .bind(id.as_uuid())
    .fetch_optional(pool)
    .await?;

    row.map(DeliveryRow::into_record).transpose()
}

/// Persist the outcome columns of a delivery.
pub async fn update(pool: &PgPool, delivery: &Delivery) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE deliveries SET status = $2, attempts = $3, last_error = $4,
             updated_at = $5, delivered_at = $6
         WHERE id = $1",
    )
    .bind(delivery.id.as_uuid())
    .bind(delivery.status.as_str())
    .bind(attempts_column(delivery.attempts))
    .bind(&delivery.last_error)
    .bind(delivery.updated_at)
    .bind(delivery.delivered_at)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        Ok(())
    } else {
        Err(StoreError::not_found("delivery", delivery.id))
    }
}

fn attempts_column(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: Uuid,
    job_id: Uuid,
    partner_id: Uuid,
    method: String,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

impl DeliveryRow {
    fn into_record(self) -> Result<Delivery, StoreError> {
        const TABLE: &str = "deliveries";
        let id = self.id;
        Ok(Delivery {
            id: DeliveryId::from_uuid(id),
            job_id: JobId::from_uuid(self.job_id),
            partner_id: PartnerId::from_uuid(self.partner_id),
            method: parse_column(TABLE, id, &self.method)?,
            status: parse_column(TABLE, id, &self.status)?,
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
            delivered_at: self.delivered_at,
        })
    }
}
