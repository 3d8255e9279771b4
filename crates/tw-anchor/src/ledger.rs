//! # Ledger Clients
//!
//! [`LedgerClient`] is the seam between the anchor worker and the chain.
//! Submission returns a transaction hash as soon as the node accepts the
//! transaction; [`LedgerClient::receipt`] returns `None` until it is mined.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tw_core::ContentDigest;

use crate::error::LedgerError;

/// Mined outcome of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReceipt {
    /// Transaction hash.
    pub tx_hash: String,
    /// Block the transaction was mined in.
    pub block_number: u64,
    /// Whether execution succeeded (`status == 0x1`).
    pub success: bool,
}

/// Records content digests on an external ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Submit `digest` for anchoring; returns the transaction hash.
    async fn submit(&self, digest: &ContentDigest) -> Result<String, LedgerError>;

    /// Look up the receipt of `tx_hash`; `None` while unmined or unknown.
    async fn receipt(&self, tx_hash: &str) -> Result<Option<LedgerReceipt>, LedgerError>;
}

// ─── Mock Ledger ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MockState {
    receipts: HashMap<String, LedgerReceipt>,
    submissions: Vec<ContentDigest>,
    fail_next: u32,
    hold_receipts: bool,
    next_block: u64,
}

/// In-process ledger that mines every submission immediately.
///
/// Used when no RPC endpoint is configured and by tests, which can inject
/// failures with [`MockLedger::fail_next`].
#[derive(Debug, Clone)]
pub struct MockLedger {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    /// An empty ledger starting at block 1.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_block: 1,
                ..MockState::default()
            })),
        }
    }

    /// Make the next `n` submissions fail as unavailable.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().fail_next = n;
    }

    /// While `true`, accepted submissions stay unmined.
    pub fn hold_receipts(&self, hold: bool) {
        self.state.lock().hold_receipts = hold;
    }

    /// Mine every held transaction.
    pub fn mine_pending(&self) {
        let mut state = self.state.lock();
        let block = state.next_block;
        let mut mined = false;
        for receipt in state.receipts.values_mut().filter(|r| r.block_number == 0) {
            receipt.block_number = block;
            mined = true;
        }
        if mined {
            state.next_block += 1;
        }
    }

    /// Every digest submitted so far, in order.
    pub fn submissions(&self) -> Vec<ContentDigest> {
        self.state.lock().submissions.clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, digest: &ContentDigest) -> Result<String, LedgerError> {
        let mut state = self.state.lock();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(LedgerError::Unavailable {
                ledger: "mock".to_string(),
                reason: "injected failure".to_string(),
            });
        }

        state.submissions.push(digest.clone());
        let nonce = state.submissions.len();
        let tx_hash = format!(
            "0x{}",
            hex::encode(Sha256::digest(format!("{}:{nonce}", digest.to_hex())))
        );

        let block_number = if state.hold_receipts {
            0
        } else {
            state.next_block += 1;
            state.next_block - 1
        };
        state.receipts.insert(
            tx_hash.clone(),
            LedgerReceipt {
                tx_hash: tx_hash.clone(),
                block_number,
                success: true,
            },
        );
        Ok(tx_hash)
    }

    async fn receipt(&self, tx_hash: &str) -> Result<Option<LedgerReceipt>, LedgerError> {
        let state = self.state.lock();
        Ok(state
            .receipts
            .get(&tx_hash.to_ascii_lowercase())
            .filter(|r| r.block_number > 0)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_core::CanonicalBytes;

    fn digest() -> ContentDigest {
        let bytes = CanonicalBytes::new(&serde_json::json!({"job": 1})).unwrap();
        tw_core::sha256_digest(&bytes)
    }

    #[tokio::test]
    async fn submissions_mine_in_consecutive_blocks() {
        let ledger = MockLedger::new();
        let a = ledger.submit(&digest()).await.unwrap();
        let b = ledger.submit(&digest()).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 66);
        assert_eq!(ledger.receipt(&a).await.unwrap().unwrap().block_number, 1);
        assert_eq!(ledger.receipt(&b).await.unwrap().unwrap().block_number, 2);
        assert_eq!(ledger.receipt("0xfeed").await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let ledger = MockLedger::new();
        ledger.fail_next(1);
        assert!(ledger.submit(&digest()).await.is_err());
        assert!(ledger.submit(&digest()).await.is_ok());
        assert_eq!(ledger.submissions().len(), 1);
    }

    #[tokio::test]
    async fn held_receipts_appear_once_mined() {
        let ledger = MockLedger::new();
        ledger.hold_receipts(true);
        let tx = ledger.submit(&digest()).await.unwrap();
        assert_eq!(ledger.receipt(&tx).await.unwrap(), None);
        ledger.mine_pending();
        let receipt = ledger.receipt(&tx).await.unwrap().unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.block_number, 1);
    }
}
