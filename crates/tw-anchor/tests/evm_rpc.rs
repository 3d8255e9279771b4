//! EVM JSON-RPC client against a mocked node.

use std::time::Duration;

use serde_json::json;
use tw_anchor::{EvmLedgerClient, EvmLedgerConfig, LedgerClient, LedgerError};
use tw_core::ContentDigest;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONTRACT: &str = "0x00000000000000000000000000000000000000aa";
const FROM: &str = "0x00000000000000000000000000000000000000bb";

fn client(server: &MockServer) -> EvmLedgerClient {
    EvmLedgerClient::new(
        EvmLedgerConfig::new(server.uri(), CONTRACT, FROM)
            .with_timeout(Duration::from_millis(300)),
    )
    .unwrap()
}

fn digest() -> ContentDigest {
    ContentDigest::from_hex(&"11".repeat(32)).unwrap()
}

#[tokio::test]
async fn submit_sends_record_digest_transaction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_sendTransaction",
            "params": [{
                "from": FROM,
                "to": CONTRACT,
                "data": format!("0x6b3ee21a{}", "11".repeat(32)),
            }]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": "0xabc123"
            })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let tx = client(&server).submit(&digest()).await.unwrap();
    assert_eq!(tx, "0xabc123");
}

#[tokio::test]
async fn receipt_reports_block_and_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_getTransactionReceipt",
            "params": ["0xok"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1,
            "result": { "status": "0x1", "blockNumber": "0x10" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_getTransactionReceipt",
            "params": ["0xreverted"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1,
            "result": { "status": "0x0", "blockNumber": "0x11" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_getTransactionReceipt",
            "params": ["0xpending"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": null
        })))
        .mount(&server)
        .await;

    let ledger = client(&server);
    let ok = ledger.receipt("0xok").await.unwrap().unwrap();
    assert!(ok.success);
    assert_eq!(ok.block_number, 16);

    let reverted = ledger.receipt("0xreverted").await.unwrap().unwrap();
    assert!(!reverted.success);

    assert_eq!(ledger.receipt("0xpending").await.unwrap(), None);
}

#[tokio::test]
async fn rpc_error_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": { "code": -32000, "message": "insufficient funds for gas" }
        })))
        .mount(&server)
        .await;

    let err = client(&server).submit(&digest()).await.unwrap_err();
    assert_eq!(
        err,
        LedgerError::Rejected {
            ledger: "evm".to_string(),
            method: "eth_sendTransaction".to_string(),
            reason: "insufficient funds for gas".to_string(),
        }
    );
}

#[tokio::test]
async fn http_failure_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = client(&server).submit(&digest()).await.unwrap_err();
    assert!(matches!(err, LedgerError::Unavailable { ref reason, .. } if reason.contains("502")));
}

#[tokio::test]
async fn slow_node_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x1" }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client(&server).submit(&digest()).await.unwrap_err();
    assert!(matches!(err, LedgerError::Unavailable { ref reason, .. } if reason.contains("timed out")));
}
