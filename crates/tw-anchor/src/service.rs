//! # Anchor Service
//!
//! Owns both sides of anchoring:
//!
//! - [`AnchorService::enqueue_anchor`] writes the job's
//!   [`BlockchainRecord`] in PENDING and only then submits the task, so no
//!   anchor task exists without a tracking row.
//! - The [`TaskHandler`] impl runs one attempt. It is idempotent: a record
//!   already CONFIRMED for the hash is a no-op, and a record that already
//!   carries a transaction hash has that receipt checked before anything
//!   is resubmitted. After submitting, the attempt polls for the receipt
//!   for up to [`ReceiptWait::timeout`]; a transaction still unmined after
//!   that keeps the record PENDING and the retry only re-checks it.
//! - The [`ExhaustionObserver`] impl leaves the record FAILED with the last
//!   attempt's error once the retry budget is spent, unless the submitted
//!   transaction has been mined in the meantime.
//! - [`AnchorService::reconcile`] confirms a PENDING or FAILED record whose
//!   transaction has since been mined.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tw_core::{ContentDigest, JobId};
use tw_queue::{ExhaustionObserver, TaskEnvelope, TaskError, TaskHandler, TaskPayload, TaskQueue};
use tw_state::{AnchorStatus, BlockchainRecord};
use tw_store::{record_or_log, AuditEvent, AuditEventKind, AuditSink, JobStore, StoreError};

use crate::error::AnchorError;
use crate::ledger::{LedgerClient, LedgerReceipt};

const RESOURCE: &str = "blockchain_record";

/// How long one attempt waits for a submitted transaction to be mined.
///
/// `timeout` must stay below the anchor worker's lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptWait {
    /// Upper bound on the wait inside one attempt. Zero checks once.
    pub timeout: Duration,
    /// Delay between receipt lookups.
    pub interval: Duration,
}

impl Default for ReceiptWait {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(2),
        }
    }
}

/// Anchor enqueue, verification, and task handling.
#[derive(Clone)]
pub struct AnchorService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    ledger: Arc<dyn LedgerClient>,
    audit: Arc<dyn AuditSink>,
    receipt_wait: ReceiptWait,
}

impl std::fmt::Debug for AnchorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorService")
            .field("ledger", &self.ledger.name())
            .field("receipt_wait", &self.receipt_wait)
            .finish_non_exhaustive()
    }
}

impl AnchorService {
    /// Wire the service to its collaborators.
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        ledger: Arc<dyn LedgerClient>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            queue,
            ledger,
            audit,
            receipt_wait: ReceiptWait::default(),
        }
    }

    /// Override how long an attempt waits for its receipt.
    pub fn with_receipt_wait(mut self, receipt_wait: ReceiptWait) -> Self {
        self.receipt_wait = receipt_wait;
        self
    }

    /// Request anchoring of `cert_hash` for `job_id`.
    ///
    /// A record already CONFIRMED for the same hash is returned unchanged
    /// and nothing is enqueued.
    pub async fn enqueue_anchor(
        &self,
        job_id: JobId,
        cert_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<BlockchainRecord, AnchorError> {
        let digest = ContentDigest::from_hex(cert_hash).ok_or_else(|| AnchorError::InvalidHash {
            value: cert_hash.to_string(),
        })?;
        let cert_hash = digest.to_hex();

        let previous = self.store.get_anchor(job_id).await?;
        let record = match &previous {
            Some(existing) if existing.is_confirmed_for(&cert_hash) => return Ok(existing.clone()),
            Some(existing) => {
                let mut rearmed = existing.clone();
                rearmed.rearm(&cert_hash, now);
                rearmed
            }
            None => BlockchainRecord::pending(job_id, cert_hash.clone(), now),
        };
        self.store.upsert_anchor(&record).await?;

        let submitted = tw_queue::submit(
            self.queue.as_ref(),
            TaskPayload::Anchor {
                job_id,
                cert_hash: cert_hash.clone(),
            },
            now,
        )
        .await;
        let task = match submitted {
            Ok(task) => task,
            Err(e) => {
                self.restore(job_id, previous).await;
                return Err(e.into());
            }
        };

        record_or_log(
            self.audit.as_ref(),
            AuditEvent::new(AuditEventKind::BlockchainAnchorCreated, RESOURCE, job_id, now)
                .by("system")
                .with_metadata(serde_json::json!({
                    "certHash": cert_hash,
                    "taskId": task.id.to_string(),
                })),
        )
        .await;
        Ok(record)
    }

    /// Put the anchor record back the way it was before a request whose
    /// task never reached the queue. A pending record without a task would
    /// never be worked.
    async fn restore(&self, job_id: JobId, previous: Option<BlockchainRecord>) {
        let restored = match &previous {
            Some(record) => self.store.upsert_anchor(record).await,
            None => self.store.delete_anchor(job_id).await,
        };
        if let Err(e) = restored {
            tracing::error!(%job_id, error = %e, "failed to roll back anchor record");
        }
    }

    /// Whether `tx_hash` is mined with a successful receipt.
    pub async fn verify_anchor(&self, tx_hash: &str) -> Result<bool, AnchorError> {
        Ok(self
            .ledger
            .receipt(tx_hash)
            .await?
            .is_some_and(|receipt| receipt.success))
    }

    /// Confirm the record of `job_id` if its submitted transaction has
    /// been mined since the worker last looked.
    ///
    /// Returns the (possibly updated) record, or `None` when the job has
    /// no anchor record.
    pub async fn reconcile(&self, job_id: JobId) -> Result<Option<BlockchainRecord>, AnchorError> {
        let Some(mut record) = self.store.get_anchor(job_id).await? else {
            return Ok(None);
        };
        if record.status == AnchorStatus::Confirmed {
            return Ok(Some(record));
        }
        let Some(tx_hash) = record.tx_hash.clone() else {
            return Ok(Some(record));
        };
        if let Some(receipt) = self.ledger.receipt(&tx_hash).await? {
            if receipt.success {
                tracing::info!(%job_id, %tx_hash, previous = %record.status, "reconciled mined anchor");
                self.record_confirmed(&mut record, &receipt).await?;
            }
        }
        Ok(Some(record))
    }

    /// Run one anchoring attempt for `job_id`.
    async fn attempt(&self, job_id: JobId, cert_hash: &str) -> Result<(), TaskError> {
        let Some(mut record) = self.store.get_anchor(job_id).await.map_err(TaskError::new)? else {
            return Err(TaskError::new(format!("no blockchain record for {job_id}")));
        };

        if record.cert_hash != cert_hash {
            tracing::info!(%job_id, cert_hash, current = %record.cert_hash, "anchor task superseded by a newer hash");
            return Ok(());
        }
        if record.status == AnchorStatus::Confirmed {
            tracing::debug!(%job_id, "anchor already confirmed");
            return Ok(());
        }

        match self.confirm(&mut record).await {
            Ok(receipt) => {
                self.record_confirmed(&mut record, &receipt)
                    .await
                    .map_err(TaskError::new)?;
                tracing::info!(
                    %job_id,
                    tx_hash = %receipt.tx_hash,
                    block_number = receipt.block_number,
                    "certificate hash anchored"
                );
                Ok(())
            }
            Err(e) => {
                let now = Utc::now();
                if matches!(e, AnchorError::NotMined { .. }) {
                    tracing::info!(%job_id, error = %e, "anchor submitted, waiting for receipt");
                    record.await_receipt(e.to_string(), now);
                } else {
                    record.fail(e.to_string(), now);
                }
                if let Err(store_err) = self.store.upsert_anchor(&record).await {
                    tracing::error!(%job_id, error = %store_err, "failed to persist anchor failure");
                }
                Err(TaskError::new(e))
            }
        }
    }

    /// Persist a successful receipt on `record` and audit it.
    async fn record_confirmed(
        &self,
        record: &mut BlockchainRecord,
        receipt: &LedgerReceipt,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        record.confirm(&receipt.tx_hash, receipt.block_number, now);
        self.store.upsert_anchor(record).await?;
        record_or_log(
            self.audit.as_ref(),
            AuditEvent::new(
                AuditEventKind::BlockchainAnchorConfirmed,
                RESOURCE,
                record.job_id,
                now,
            )
            .by("system")
            .with_metadata(serde_json::json!({
                "txHash": receipt.tx_hash,
                "blockNumber": receipt.block_number,
            })),
        )
        .await;
        Ok(())
    }

    /// Drive `record` to a successful receipt, submitting if needed.
    async fn confirm(&self, record: &mut BlockchainRecord) -> Result<LedgerReceipt, AnchorError> {
        let digest =
            ContentDigest::from_hex(&record.cert_hash).ok_or_else(|| AnchorError::InvalidHash {
                value: record.cert_hash.clone(),
            })?;

        if let Some(tx_hash) = record.tx_hash.clone() {
            match self.wait_for_receipt(&tx_hash).await? {
                Some(receipt) if receipt.success => return Ok(receipt),
                Some(_) => {
                    tracing::warn!(job_id = %record.job_id, %tx_hash, "previous anchor transaction reverted; resubmitting");
                }
                None => return Err(AnchorError::NotMined { tx_hash }),
            }
        }

        let tx_hash = self.ledger.submit(&digest).await?;
        record.mark_submitted(&tx_hash, Utc::now());
        self.store.upsert_anchor(record).await?;

        match self.wait_for_receipt(&tx_hash).await? {
            Some(receipt) if receipt.success => Ok(receipt),
            Some(_) => Err(AnchorError::Reverted { tx_hash }),
            None => Err(AnchorError::NotMined { tx_hash }),
        }
    }

    /// Poll for the receipt of `tx_hash` until it appears or the wait
    /// budget runs out.
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<Option<LedgerReceipt>, AnchorError> {
        let deadline = Instant::now() + self.receipt_wait.timeout;
        loop {
            if let Some(receipt) = self.ledger.receipt(tx_hash).await? {
                return Ok(Some(receipt));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            tokio::time::sleep(self.receipt_wait.interval.min(remaining)).await;
        }
    }
}

#[async_trait]
impl TaskHandler for AnchorService {
    async fn handle(&self, task: &TaskEnvelope) -> Result<(), TaskError> {
        match &task.payload {
            TaskPayload::Anchor { job_id, cert_hash } => self.attempt(*job_id, cert_hash).await,
            other => Err(TaskError::new(format!(
                "{} payload on the anchor queue",
                other.queue()
            ))),
        }
    }
}

#[async_trait]
impl ExhaustionObserver for AnchorService {
    async fn on_exhausted(&self, task: &TaskEnvelope) {
        let TaskPayload::Anchor { job_id, cert_hash } = &task.payload else {
            return;
        };
        let error = task.last_error.clone().unwrap_or_default();
        let now = Utc::now();

        match self.store.get_anchor(*job_id).await {
            Ok(Some(mut record)) if record.cert_hash == *cert_hash => {
                if record.status == AnchorStatus::Confirmed {
                    return;
                }
                if let Some(tx_hash) = record.tx_hash.clone() {
                    match self.ledger.receipt(&tx_hash).await {
                        Ok(Some(receipt)) if receipt.success => {
                            tracing::info!(%job_id, %tx_hash, "anchor mined after its last attempt");
                            if let Err(e) = self.record_confirmed(&mut record, &receipt).await {
                                tracing::error!(%job_id, error = %e, "failed to persist late confirmation");
                            }
                            return;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(%job_id, %tx_hash, error = %e, "final receipt check failed");
                        }
                    }
                }
                record.fail(error.clone(), now);
                if let Err(e) = self.store.upsert_anchor(&record).await {
                    tracing::error!(%job_id, error = %e, "failed to persist exhausted anchor");
                }
            }
            Ok(_) => return,
            Err(e) => {
                tracing::error!(%job_id, error = %e, "failed to load exhausted anchor");
            }
        }

        record_or_log(
            self.audit.as_ref(),
            AuditEvent::new(AuditEventKind::BlockchainAnchorFailed, RESOURCE, job_id, now)
                .by("system")
                .with_metadata(serde_json::json!({
                    "certHash": cert_hash,
                    "attempts": task.attempts,
                    "error": error,
                })),
        )
        .await;
    }
}
