//! Errors raised by ledger clients and the anchor service.

use thiserror::Error;
use tw_queue::QueueError;
use tw_store::StoreError;

/// A ledger call that did not produce a usable answer.
///
/// Every variant is transient from the queue's point of view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The endpoint could not be reached, timed out, or answered non-2xx.
    #[error("ledger {ledger} unavailable: {reason}")]
    Unavailable {
        /// Ledger name.
        ledger: String,
        /// Transport-level reason.
        reason: String,
    },

    /// The endpoint answered with a JSON-RPC error or a malformed result.
    #[error("ledger {ledger} rejected {method}: {reason}")]
    Rejected {
        /// Ledger name.
        ledger: String,
        /// RPC method.
        method: String,
        /// Error message from the node.
        reason: String,
    },

    /// Client construction failed.
    #[error("invalid ledger configuration: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: String,
    },
}

/// Failures of [`crate::AnchorService`] operations.
#[derive(Error, Debug)]
pub enum AnchorError {
    /// The certificate hash is not 64 hex characters.
    #[error("invalid certificate hash {value:?}: expected 64 hex characters")]
    InvalidHash {
        /// Rejected input.
        value: String,
    },

    /// The submitted transaction has no receipt yet.
    #[error("transaction {tx_hash} not yet mined")]
    NotMined {
        /// Pending transaction.
        tx_hash: String,
    },

    /// The transaction was mined but execution failed.
    #[error("transaction {tx_hash} reverted")]
    Reverted {
        /// Reverted transaction.
        tx_hash: String,
    },

    /// The ledger call failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Persisting the blockchain record failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Enqueueing the anchor task failed.
    #[error(transparent)]
    Queue(#[from] QueueError),
}
