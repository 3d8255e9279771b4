//! Content-addressing properties of certificate hashes.

use proptest::prelude::*;
use tw_core::{sha256_hex, CanonicalBytes};

fn certificate(serial: &str, passes: u32) -> serde_json::Value {
    serde_json::json!({
        "device": {"serial": serial, "mediaType": "HDD"},
        "method": "OVERWRITE",
        "nistCategory": "CLEAR",
        "passes": passes,
    })
}

#[test]
fn same_payload_hashes_identically() {
    let a = CanonicalBytes::new(&certificate("WD-1234", 3)).unwrap();
    let b = CanonicalBytes::new(&certificate("WD-1234", 3)).unwrap();
    assert_eq!(sha256_hex(&a), sha256_hex(&b));
}

#[test]
fn uploaded_bytes_with_different_layout_hash_identically() {
    let compact = br#"{"method":"OVERWRITE","device":{"serial":"WD-1234"}}"#;
    let pretty = b"{\n  \"device\": { \"serial\": \"WD-1234\" },\n  \"method\": \"OVERWRITE\"\n}";
    let a = CanonicalBytes::from_json_document(compact).unwrap();
    let b = CanonicalBytes::from_json_document(pretty).unwrap();
    assert_eq!(sha256_hex(&a), sha256_hex(&b));
}

#[test]
fn one_character_change_changes_hash() {
    let a = CanonicalBytes::new(&certificate("WD-1234", 3)).unwrap();
    let b = CanonicalBytes::new(&certificate("WD-1235", 3)).unwrap();
    assert_ne!(sha256_hex(&a), sha256_hex(&b));
}

proptest! {
    #[test]
    fn distinct_serials_never_collide(a in "[A-Z0-9]{8}", b in "[A-Z0-9]{8}") {
        prop_assume!(a != b);
        let ha = sha256_hex(&CanonicalBytes::new(&certificate(&a, 1)).unwrap());
        let hb = sha256_hex(&CanonicalBytes::new(&certificate(&b, 1)).unwrap());
        prop_assert_ne!(ha, hb);
    }

    #[test]
    fn hashing_is_pure(serial in "[A-Z0-9-]{1,20}", passes in 0u32..35) {
        let cert = certificate(&serial, passes);
        let first = sha256_hex(&CanonicalBytes::new(&cert).unwrap());
        let second = sha256_hex(&CanonicalBytes::new(&cert).unwrap());
        prop_assert_eq!(first, second);
    }
}
