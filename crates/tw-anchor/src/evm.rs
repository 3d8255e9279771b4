//! # EVM JSON-RPC Ledger
//!
//! Anchors certificate hashes by calling `recordDigest(bytes32)` on a
//! digest-registry contract through `eth_sendTransaction`. Signing is
//! delegated to the RPC provider: `from` must be an account the endpoint
//! manages. Receipts come from `eth_getTransactionReceipt`.
//!
//! Every request carries the configured timeout; a timeout is reported as
//! [`LedgerError::Unavailable`] and retried like any other failure.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tw_core::ContentDigest;

use crate::error::LedgerError;
use crate::ledger::{LedgerClient, LedgerReceipt};

/// 4-byte selector of `recordDigest(bytes32)`.
const RECORD_DIGEST_SELECTOR: &str = "6b3ee21a";

const LEDGER_NAME: &str = "evm";

/// Connection settings.
#[derive(Debug, Clone)]
pub struct EvmLedgerConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Digest registry contract (0x + 40 hex).
    pub contract_address: String,
    /// Sending account managed by the endpoint (0x + 40 hex).
    pub from_address: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl EvmLedgerConfig {
    /// Settings with the default 30 s timeout.
    pub fn new(
        rpc_url: impl Into<String>,
        contract_address: impl Into<String>,
        from_address: impl Into<String>,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            contract_address: contract_address.into(),
            from_address: from_address.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`LedgerClient`] over EVM JSON-RPC.
#[derive(Debug)]
pub struct EvmLedgerClient {
    client: reqwest::Client,
    config: EvmLedgerConfig,
}

impl EvmLedgerClient {
    /// Validate addresses and build the HTTP client.
    pub fn new(config: EvmLedgerConfig) -> Result<Self, LedgerError> {
        if !is_valid_eth_address(&config.contract_address) {
            return Err(LedgerError::InvalidConfig {
                reason: format!("invalid contract address: {}", config.contract_address),
            });
        }
        if !is_valid_eth_address(&config.from_address) {
            return Err(LedgerError::InvalidConfig {
                reason: format!("invalid from address: {}", config.from_address),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LedgerError::InvalidConfig {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, config })
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let unavailable = |reason: String| LedgerError::Unavailable {
            ledger: LEDGER_NAME.to_string(),
            reason,
        };

        let resp = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    unavailable(format!("{method} timed out"))
                } else {
                    unavailable(format!("{method}: {e}"))
                }
            })?;

        if !resp.status().is_success() {
            return Err(unavailable(format!("{method}: HTTP {}", resp.status())));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| unavailable(format!("{method}: invalid JSON response: {e}")))?;

        if let Some(error) = json.get("error") {
            let reason = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC error");
            return Err(self.rejected(method, reason));
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| self.rejected(method, "response missing 'result' field"))
    }

    fn rejected(&self, method: &str, reason: &str) -> LedgerError {
        LedgerError::Rejected {
            ledger: LEDGER_NAME.to_string(),
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// ABI calldata: selector followed by the 32-byte digest.
fn encode_calldata(digest: &ContentDigest) -> String {
    format!("0x{RECORD_DIGEST_SELECTOR}{}", digest.to_hex())
}

fn parse_quantity(value: Option<&Value>) -> Option<u64> {
    value
        .and_then(Value::as_str)
        .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
}

/// Whether `addr` is `0x` followed by 40 hex digits.
fn is_valid_eth_address(addr: &str) -> bool {
    addr.len() == 42
        && addr.starts_with("0x")
        && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
}

#[async_trait]
impl LedgerClient for EvmLedgerClient {
    fn name(&self) -> &str {
        LEDGER_NAME
    }

    async fn submit(&self, digest: &ContentDigest) -> Result<String, LedgerError> {
        let tx = json!({
            "from": self.config.from_address,
            "to": self.config.contract_address,
            "data": encode_calldata(digest),
        });
        let result = self.rpc_call("eth_sendTransaction", json!([tx])).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.rejected("eth_sendTransaction", "non-string result"))
    }

    async fn receipt(&self, tx_hash: &str) -> Result<Option<LedgerReceipt>, LedgerError> {
        let receipt = self
            .rpc_call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if receipt.is_null() {
            return Ok(None);
        }

        // Pre-Byzantium receipts have no status; treat a mined tx as success.
        let success = receipt
            .get("status")
            .and_then(Value::as_str)
            .map_or(true, |s| s != "0x0");

        Ok(Some(LedgerReceipt {
            tx_hash: tx_hash.to_string(),
            block_number: parse_quantity(receipt.get("blockNumber")).unwrap_or(0),
            success,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: &str = "0x0000000000000000000000000000000000000001";
    const FROM: &str = "0x0000000000000000000000000000000000000002";

    #[test]
    fn valid_eth_addresses() {
        assert!(is_valid_eth_address("0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef"));
        assert!(is_valid_eth_address("0xAbCdEf0123456789AbCdEf0123456789AbCdEf01"));
    }

    #[test]
    fn invalid_eth_addresses() {
        assert!(!is_valid_eth_address(""));
        assert!(!is_valid_eth_address("0x123"));
        assert!(!is_valid_eth_address("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef00"));
        assert!(!is_valid_eth_address("0xGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGG"));
    }

    #[test]
    fn calldata_is_selector_then_digest() {
        let digest = ContentDigest::from_hex(&"ab".repeat(32)).unwrap();
        let calldata = encode_calldata(&digest);
        assert_eq!(calldata.len(), 74);
        assert!(calldata.starts_with("0x6b3ee21a"));
        assert!(calldata.ends_with(&"ab".repeat(32)));
    }

    #[test]
    fn rejects_bad_addresses() {
        let err = EvmLedgerClient::new(EvmLedgerConfig::new("http://rpc", "nope", FROM))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidConfig { .. }));
        assert!(EvmLedgerClient::new(EvmLedgerConfig::new("http://rpc", CONTRACT, "x")).is_err());
    }

    #[test]
    fn quantities_parse_as_hex() {
        assert_eq!(parse_quantity(Some(&json!("0x1b4"))), Some(436));
        assert_eq!(parse_quantity(Some(&json!(12))), None);
        assert_eq!(parse_quantity(None), None);
    }
}
