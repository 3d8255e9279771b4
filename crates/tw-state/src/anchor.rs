//! # Ledger Anchor Records
//!
//! One [`BlockchainRecord`] per job, created in PENDING before its anchor
//! task is enqueued. The record always reflects the most recent attempt:
//! a FAILED record returns to CONFIRMED when a retry succeeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tw_core::JobId;

/// Anchoring state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnchorStatus {
    /// Requested; not yet confirmed on-chain.
    Pending,
    /// Mined with a successful receipt.
    Confirmed,
    /// The most recent attempt failed.
    Failed,
}

wire_enum!(AnchorStatus, "anchor status", {
    Pending => "PENDING",
    Confirmed => "CONFIRMED",
    Failed => "FAILED",
});

/// Tracking row for a certificate hash anchored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainRecord {
    /// Owning job (one record per job).
    pub job_id: JobId,
    /// Anchored certificate hash (lowercase hex).
    pub cert_hash: String,
    /// Anchoring state.
    pub status: AnchorStatus,
    /// Transaction hash, recorded as soon as the ledger accepts it.
    pub tx_hash: Option<String>,
    /// Block number, once confirmed.
    pub block_number: Option<u64>,
    /// Error from the most recent failed attempt.
    pub last_error: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl BlockchainRecord {
    /// A fresh PENDING record.
    pub fn pending(job_id: JobId, cert_hash: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            cert_hash: cert_hash.into(),
            status: AnchorStatus::Pending,
            tx_hash: None,
            block_number: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this record already proves `cert_hash` on-chain.
    pub fn is_confirmed_for(&self, cert_hash: &str) -> bool {
        self.status == AnchorStatus::Confirmed && self.cert_hash == cert_hash
    }

    /// Reset to PENDING for a (possibly different) hash.
    ///
    /// A new hash discards the previous submission.
    pub fn rearm(&mut self, cert_hash: &str, now: DateTime<Utc>) {
        if self.cert_hash != cert_hash {
            self.cert_hash = cert_hash.to_string();
            self.tx_hash = None;
            self.block_number = None;
        }
        self.status = AnchorStatus::Pending;
        self.last_error = None;
        self.updated_at = now;
    }

    /// Record a ledger-accepted submission that is not yet mined.
    pub fn mark_submitted(&mut self, tx_hash: impl Into<String>, now: DateTime<Utc>) {
        self.tx_hash = Some(tx_hash.into());
        self.updated_at = now;
    }

    /// Record a successful receipt.
    pub fn confirm(&mut self, tx_hash: impl Into<String>, block_number: u64, now: DateTime<Utc>) {
        self.status = AnchorStatus::Confirmed;
        self.tx_hash = Some(tx_hash.into());
        self.block_number = Some(block_number);
        self.last_error = None;
        self.updated_at = now;
    }

    /// Note an attempt that ended with the transaction still unmined.
    ///
    /// The record stays PENDING; `error` explains the wait.
    pub fn await_receipt(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = AnchorStatus::Pending;
        self.last_error = Some(error.into());
        self.updated_at = now;
    }

    /// Record a failed attempt.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = AnchorStatus::Failed;
        self.last_error = Some(error.into());
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_record_can_be_confirmed_by_retry() {
        let now = Utc::now();
        let mut r = BlockchainRecord::pending(JobId::new(), "ab", now);
        r.fail("rpc timeout", now);
        assert_eq!(r.status, AnchorStatus::Failed);
        r.confirm("0x01", 7, now);
        assert_eq!(r.status, AnchorStatus::Confirmed);
        assert_eq!(r.last_error, None);
        assert!(r.is_confirmed_for("ab"));
        assert!(!r.is_confirmed_for("cd"));
    }

    #[test]
    fn unmined_submission_stays_pending() {
        let now = Utc::now();
        let mut r = BlockchainRecord::pending(JobId::new(), "ab", now);
        r.mark_submitted("0x01", now);
        r.await_receipt("transaction 0x01 not yet mined", now);
        assert_eq!(r.status, AnchorStatus::Pending);
        assert_eq!(r.tx_hash.as_deref(), Some("0x01"));
        assert!(r.last_error.is_some());
    }

    #[test]
    fn rearm_with_new_hash_drops_submission() {
        let now = Utc::now();
        let mut r = BlockchainRecord::pending(JobId::new(), "ab", now);
        r.confirm("0x01", 7, now);
        r.rearm("ab", now);
        assert_eq!(r.tx_hash.as_deref(), Some("0x01"));
        r.rearm("cd", now);
        assert_eq!(r.status, AnchorStatus::Pending);
        assert_eq!(r.tx_hash, None);
        assert_eq!(r.block_number, None);
    }
}
