//! # Audit Log
//!
//! Orchestrator and workers report every business event through
//! [`AuditSink::record`]. Event kinds are a closed enum; each kind knows
//! whether it is critical.
//!
//! ## Hash Chain
//!
//! The in-memory and PostgreSQL sinks chain events: each stored event
//! carries the hash of its predecessor and its own
//! `SHA-256(previous_hash, kind, actor, resource_type, resource_id,
//! occurred_at)`. The first event chains to [`GENESIS_HASH`].
//! [`verify_chain`] detects both a broken link and an edited event.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;

/// `previous_hash` of the first event in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Advisory lock key serializing appends to `audit_events`.
const AUDIT_APPEND_LOCK: i64 = 0x7457_6175_6469_7400;

// ─── Event Kinds ─────────────────────────────────────────────────────

/// Every auditable business event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventKind {
    WipeJobCreated,
    WipeJobStarted,
    WipeJobCompleted,
    WipeJobFailed,
    WipeJobCancelled,
    WipeResultIngested,
    CertificateGenerated,
    CertificateUploaded,
    BlockchainAnchorCreated,
    BlockchainAnchorConfirmed,
    BlockchainAnchorFailed,
    DeliveryCreated,
    DeliveryCompleted,
    DeliveryFailed,
    AgentEnrolled,
    AgentStatusChanged,
    UserCreated,
}

impl AuditEventKind {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WipeJobCreated => "WIPE_JOB_CREATED",
            Self::WipeJobStarted => "WIPE_JOB_STARTED",
            Self::WipeJobCompleted => "WIPE_JOB_COMPLETED",
            Self::WipeJobFailed => "WIPE_JOB_FAILED",
            Self::WipeJobCancelled => "WIPE_JOB_CANCELLED",
            Self::WipeResultIngested => "WIPE_RESULT_INGESTED",
            Self::CertificateGenerated => "CERTIFICATE_GENERATED",
            Self::CertificateUploaded => "CERTIFICATE_UPLOADED",
            Self::BlockchainAnchorCreated => "BLOCKCHAIN_ANCHOR_CREATED",
            Self::BlockchainAnchorConfirmed => "BLOCKCHAIN_ANCHOR_CONFIRMED",
            Self::BlockchainAnchorFailed => "BLOCKCHAIN_ANCHOR_FAILED",
            Self::DeliveryCreated => "DELIVERY_CREATED",
            Self::DeliveryCompleted => "DELIVERY_COMPLETED",
            Self::DeliveryFailed => "DELIVERY_FAILED",
            Self::AgentEnrolled => "AGENT_ENROLLED",
            Self::AgentStatusChanged => "AGENT_STATUS_CHANGED",
            Self::UserCreated => "USER_CREATED",
        }
    }

    /// Critical events are surfaced at `warn` by the tracing sink.
    ///
    /// Terminal ledger and delivery failures are critical so an operator
    /// sees every exhausted retry budget.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::WipeJobCreated
                | Self::WipeJobStarted
                | Self::WipeJobCompleted
                | Self::CertificateGenerated
                | Self::CertificateUploaded
                | Self::BlockchainAnchorCreated
                | Self::BlockchainAnchorFailed
                | Self::DeliveryFailed
                | Self::AgentEnrolled
                | Self::UserCreated
        )
    }
}

impl std::fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditEventKind {
    type Err = tw_core::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_ascii_uppercase()))
            .map_err(|_| tw_core::ParseEnumError::new("audit event kind", s))
    }
}

// ─── Events ──────────────────────────────────────────────────────────

/// One auditable occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// What happened.
    pub kind: AuditEventKind,
    /// Who did it (`user:<id>`, `agent:<id>`, or `system`).
    pub actor: Option<String>,
    /// Affected entity type, e.g. `wipe_job`.
    pub resource_type: String,
    /// Affected entity identifier.
    pub resource_id: String,
    /// Free-form context; not covered by the chain hash.
    pub metadata: serde_json::Value,
    /// When it happened, truncated to microseconds.
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    /// A new event without actor or metadata.
    pub fn new(
        kind: AuditEventKind,
        resource_type: impl Into<String>,
        resource_id: impl std::fmt::Display,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            actor: None,
            resource_type: resource_type.into(),
            resource_id: resource_id.to_string(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            occurred_at: now.trunc_subsecs(6),
        }
    }

    /// Attribute the event to an actor.
    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Attach context.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Chain hash of `event` following `previous_hash`.
pub fn chain_hash(previous_hash: &str, event: &AuditEvent) -> String {
    let occurred_at = event.occurred_at.to_rfc3339_opts(SecondsFormat::Micros, true);
    let mut hasher = Sha256::new();
    for field in [
        previous_hash,
        event.kind.as_str(),
        event.actor.as_deref().unwrap_or(""),
        event.resource_type.as_str(),
        event.resource_id.as_str(),
        occurred_at.as_str(),
    ] {
        hasher.update(field.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// A stored event with its chain links.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainedEvent {
    /// Row identifier.
    pub id: Uuid,
    /// The event.
    #[serde(flatten)]
    pub event: AuditEvent,
    /// Hash of the predecessor, or [`GENESIS_HASH`].
    pub previous_hash: String,
    /// Hash of this event.
    pub event_hash: String,
}

/// Result of [`verify_chain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainIntegrity {
    /// Events examined.
    pub total_events: usize,
    /// Events whose `previous_hash` does not match their predecessor.
    pub broken_links: usize,
    /// Events whose stored hash does not match their content.
    pub tampered_events: usize,
    /// No broken link and no tampered event.
    pub chain_valid: bool,
}

/// Check link continuity and recompute every hash, oldest first.
pub fn verify_chain(events: &[ChainedEvent]) -> ChainIntegrity {
    let mut broken_links = 0;
    let mut tampered_events = 0;
    let mut expected_prev = GENESIS_HASH;

    for stored in events {
        if stored.previous_hash != expected_prev {
            broken_links += 1;
        }
        if chain_hash(&stored.previous_hash, &stored.event) != stored.event_hash {
            tampered_events += 1;
        }
        expected_prev = &stored.event_hash;
    }

    ChainIntegrity {
        total_events: events.len(),
        broken_links,
        tampered_events,
        chain_valid: broken_links == 0 && tampered_events == 0,
    }
}

// ─── Sinks ───────────────────────────────────────────────────────────

/// Append-only audit log collaborator.
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    /// Append one event.
    async fn record(&self, event: AuditEvent) -> Result<(), StoreError>;
}

/// Record `event`, logging instead of failing when the sink errors.
///
/// Business operations never roll back because the audit log is down.
pub async fn record_or_log(sink: &dyn AuditSink, event: AuditEvent) {
    let kind = event.kind;
    let resource_id = event.resource_id.clone();
    if let Err(e) = sink.record(event).await {
        tracing::error!(%kind, resource_id, error = %e, "failed to record audit event");
    }
}

/// Emits events as structured log lines under the `trustwipe::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), StoreError> {
        let actor = event.actor.as_deref().unwrap_or("system");
        if event.kind.is_critical() {
            tracing::warn!(
                target: "trustwipe::audit",
                kind = %event.kind,
                actor,
                resource_type = %event.resource_type,
                resource_id = %event.resource_id,
                metadata = %event.metadata,
                "critical audit event"
            );
        } else {
            tracing::info!(
                target: "trustwipe::audit",
                kind = %event.kind,
                actor,
                resource_type = %event.resource_type,
                resource_id = %event.resource_id,
                metadata = %event.metadata,
                "audit event"
            );
        }
        Ok(())
    }
}

/// Hash-chained log held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<ChainedEvent>>>,
}

impl MemoryAuditSink {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored event, oldest first.
    pub fn events(&self) -> Vec<ChainedEvent> {
        self.events.lock().clone()
    }

    /// The kinds of every stored event, oldest first.
    pub fn kinds(&self) -> Vec<AuditEventKind> {
        self.events.lock().iter().map(|e| e.event.kind).collect()
    }

    /// Verify the stored chain.
    pub fn verify_chain(&self) -> ChainIntegrity {
        verify_chain(&self.events.lock())
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), StoreError> {
        let mut events = self.events.lock();
        let previous_hash = events
            .last()
            .map(|e| e.event_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let event_hash = chain_hash(&previous_hash, &event);
        events.push(ChainedEvent {
            id: Uuid::new_v4(),
            event,
            previous_hash,
            event_hash,
        });
        Ok(())
    }
}

/// Forwards each event to every inner sink.
#[derive(Clone, Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    /// Fan out to `sinks`, in order.
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AuditSink for FanoutAuditSink {
    /// Every sink sees the event even when an earlier one fails; the
    /// first failure is returned.
    async fn record(&self, event: AuditEvent) -> Result<(), StoreError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(event.clone()).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Hash-chained log in the `audit_events` table.
#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    /// Append to the database behind `pool`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Verify the oldest `limit` events.
    pub async fn verify_chain_integrity(&self, limit: i64) -> Result<ChainIntegrity, StoreError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT id, event_type, actor, resource_type, resource_id, metadata,
                    previous_hash, event_hash, created_at
             FROM audit_events ORDER BY seq ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let events = rows
            .into_iter()
            .map(AuditRow::into_chained)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(verify_chain(&events))
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Two appenders must not both chain to the same predecessor.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(AUDIT_APPEND_LOCK)
            .execute(&mut *tx)
            .await?;

        let previous_hash: Option<String> =
            sqlx::query_scalar("SELECT event_hash FROM audit_events ORDER BY seq DESC LIMIT 1")
                .fetch_optional(&mut *tx)
                .await?;
        let previous_hash = previous_hash.unwrap_or_else(|| GENESIS_HASH.to_string());
        let event_hash = chain_hash(&previous_hash, &event);

        sqlx::query(
            "INSERT INTO audit_events (id, event_type, critical, actor, resource_type, resource_id,
                 metadata, previous_hash, event_hash, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(Uuid::new_v4())
        .bind(event.kind.as_str())
        .bind(event.kind.is_critical())
        .bind(&event.actor)
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(&event.metadata)
        .bind(&previous_hash)
        .bind(&event_hash)
        .bind(event.occurred_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    event_type: String,
    actor: Option<String>,
    resource_type: String,
    resource_id: String,
    metadata: serde_json::Value,
    previous_hash: String,
    event_hash: String,
    created_at: DateTime<Utc>,
}

impl AuditRow {
    fn into_chained(self) -> Result<ChainedEvent, StoreError> {
        Ok(ChainedEvent {
            id: self.id,
            event: AuditEvent {
                kind: crate::pg::parse_column("audit_events", self.id, &self.event_type)?,
                actor: self.actor,
                resource_type: self.resource_type,
                resource_id: self.resource_id,
                metadata: self.metadata,
                occurred_at: self.created_at,
            },
            previous_hash: self.previous_hash,
            event_hash: self.event_hash,
        })
    }
}
