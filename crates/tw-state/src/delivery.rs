//! # Partners and Deliveries
//!
//! A [`Delivery`] hands a job's certificate to a [`Partner`]. Every task
//! outcome, success or failure, increments `attempts`; the status always
//! reflects the latest outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tw_core::{DeliveryId, DeliveryMethod, JobId, PartnerId};

// ─── Partner ─────────────────────────────────────────────────────────

/// Registration request for a partner.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPartner {
    /// Display name.
    pub name: String,
    /// Webhook endpoint.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Contact address for email delivery.
    #[serde(default)]
    pub contact_email: Option<String>,
    /// Base URL of the partner's certificate API.
    #[serde(default)]
    pub api_base: Option<String>,
    /// Bearer token for the partner's API.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for NewPartner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewPartner")
            .field("name", &self.name)
            .field("webhook_url", &self.webhook_url)
            .field("contact_email", &self.contact_email)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// A recycler or consumer endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partner {
    /// Unique identifier.
    pub id: PartnerId,
    /// Display name.
    pub name: String,
    /// Webhook endpoint.
    pub webhook_url: Option<String>,
    /// Contact address for email delivery.
    pub contact_email: Option<String>,
    /// Base URL of the partner's certificate API.
    pub api_base: Option<String>,
    /// Bearer token for the partner's API. Never serialized.
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl Partner {
    /// Register a partner.
    pub fn new(new: NewPartner, now: DateTime<Utc>) -> Self {
        Self {
            id: PartnerId::new(),
            name: new.name,
            webhook_url: new.webhook_url,
            contact_email: new.contact_email,
            api_base: new.api_base,
            api_key: new.api_key,
            created_at: now,
        }
    }

    /// Whether the partner is configured for `method`.
    pub fn supports(&self, method: DeliveryMethod) -> bool {
        match method {
            DeliveryMethod::Webhook => self.webhook_url.is_some(),
            DeliveryMethod::Email => self.contact_email.is_some(),
            DeliveryMethod::Api => self.api_base.is_some() && self.api_key.is_some(),
        }
    }
}

impl std::fmt::Debug for Partner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partner")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("webhook_url", &self.webhook_url)
            .field("contact_email", &self.contact_email)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ─── Delivery ────────────────────────────────────────────────────────

/// Delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Created; no attempt has finished yet.
    Pending,
    /// The most recent attempt succeeded.
    Delivered,
    /// The most recent attempt failed.
    Failed,
}

wire_enum!(DeliveryStatus, "delivery status", {
    Pending => "PENDING",
    Delivered => "DELIVERED",
    Failed => "FAILED",
});

/// A requested certificate handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    /// Unique identifier.
    pub id: DeliveryId,
    /// Job whose certificate is delivered.
    pub job_id: JobId,
    /// Receiving partner.
    pub partner_id: PartnerId,
    /// Transport.
    pub method: DeliveryMethod,
    /// Delivery state.
    pub status: DeliveryStatus,
    /// Finished attempts, successful or not.
    pub attempts: u32,
    /// Error from the most recent failed attempt.
    pub last_error: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
    /// Time of the successful attempt.
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Delivery {
    /// A fresh PENDING delivery.
    pub fn new(
        job_id: JobId,
        partner_id: PartnerId,
        method: DeliveryMethod,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DeliveryId::new(),
            job_id,
            partner_id,
            method,
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            delivered_at: None,
        }
    }

    /// Record a successful attempt.
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.status = DeliveryStatus::Delivered;
        self.attempts += 1;
        self.last_error = None;
        self.delivered_at = Some(now);
        self.updated_at = now;
    }

    /// Record a failed attempt.
    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = DeliveryStatus::Failed;
        self.attempts += 1;
        self.last_error = Some(error.into());
        self.updated_at = now;
    }
}
