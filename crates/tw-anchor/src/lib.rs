//! # tw-anchor: Ledger Anchoring
//!
//! Records certificate content hashes on an external ledger as
//! tamper-evident proof of existence.
//!
//! - [`LedgerClient`]: the chain seam, with [`EvmLedgerClient`] for
//!   EVM JSON-RPC endpoints and [`MockLedger`] for tests and ledger-less
//!   deployments.
//! - [`AnchorService`]: enqueue contract, idempotent task handler,
//!   exhaustion observer, and `verify_anchor`.

pub mod error;
pub mod evm;
pub mod ledger;
pub mod service;

pub use error::{AnchorError, LedgerError};
pub use evm::{EvmLedgerClient, EvmLedgerConfig};
pub use ledger::{LedgerClient, LedgerReceipt, MockLedger};
pub use service::{AnchorService, ReceiptWait};
