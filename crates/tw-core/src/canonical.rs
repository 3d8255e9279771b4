//! # Canonical Serialization: RFC 8785 Byte Production
//!
//! `CanonicalBytes` is the sole construction path for bytes that feed a
//! certificate content hash.
//!
//! ## Security Invariant
//!
//! The inner buffer is private. The only constructors run the value through
//! `serde_jcs`, which sorts object keys, strips insignificant whitespace,
//! and serializes numbers in their shortest round-trip form. The content
//! hash is therefore a pure function of the JSON *value*, not of the bytes
//! an agent happened to upload.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization (RFC 8785).
///
/// # Invariants
///
/// - Object keys are sorted by UTF-16 code units.
/// - Separators are compact (`,` and `:`), no trailing whitespace.
/// - Numbers use the ECMAScript shortest representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        Ok(Self(serde_jcs::to_vec(&value)?))
    }

    /// Parse a raw uploaded JSON document and canonicalize it.
    ///
    /// Certificate payloads must be JSON objects; arrays and scalars are
    /// rejected with [`CanonicalizationError::NotAnObject`].
    pub fn from_json_document(raw: &[u8]) -> Result<Self, CanonicalizationError> {
        let value: Value =
            serde_json::from_slice(raw).map_err(CanonicalizationError::InvalidJson)?;
        Self::from_object(&value)
    }

    /// Canonicalize an already-parsed JSON value that must be an object.
    pub fn from_object(value: &Value) -> Result<Self, CanonicalizationError> {
        if !value.is_object() {
            return Err(CanonicalizationError::NotAnObject {
                found: json_type_name(value),
            });
        }
        Self::new(value)
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_keys_compact_separators() {
        let data = serde_json::json!({"b": 2, "a": 1, "c": "hello"});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"a":1,"b":2,"c":"hello"}"#);
    }

    #[test]
    fn test_nested_objects_sorted() {
        let data = serde_json::json!({
            "outer": {"b": 2, "a": 1},
            "list": [3, 2, 1]
        });
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"list":[3,2,1],"outer":{"a":1,"b":2}}"#);
    }

    #[test]
    fn test_whitespace_and_key_order_do_not_matter() {
        let a = CanonicalBytes::from_json_document(br#"{ "jobId": "j1", "passes": 3 }"#).unwrap();
        let b = CanonicalBytes::from_json_document(b"{\"passes\":3,\n\"jobId\":\"j1\"}").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_floats_serialize_shortest_form() {
        let cb = CanonicalBytes::from_json_document(br#"{"throughput": 1.50, "ratio": 1e2}"#)
            .unwrap();
        assert_eq!(cb.as_bytes(), br#"{"ratio":100,"throughput":1.5}"#);
    }

    #[test]
    fn test_non_object_document_rejected() {
        let err = CanonicalBytes::from_json_document(b"[1,2,3]").unwrap_err();
        assert!(matches!(err, CanonicalizationError::NotAnObject { found: "array" }));
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = CanonicalBytes::from_json_document(b"{not json").unwrap_err();
        assert!(matches!(err, CanonicalizationError::InvalidJson(_)));
    }

    #[test]
    fn test_unicode_passthrough() {
        let data = serde_json::json!({"name": "\u{00e9}t\u{00e9}"});
        let cb = CanonicalBytes::new(&data).unwrap();
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert!(s.contains('\u{00e9}'));
    }

    #[test]
    fn test_empty_object() {
        let cb = CanonicalBytes::from_object(&serde_json::json!({})).unwrap();
        assert_eq!(cb.as_bytes(), b"{}");
        assert!(!cb.is_empty());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| serde_json::json!(n)),
            "[a-zA-Z0-9_ ]{0,40}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,10}", inner, 0..8)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn canonical_bytes_deterministic(value in json_value()) {
            let a = CanonicalBytes::new(&value).unwrap();
            let b = CanonicalBytes::new(&value).unwrap();
            prop_assert_eq!(a.as_bytes(), b.as_bytes());
        }

        #[test]
        fn canonical_bytes_reparse_to_same_value(value in json_value()) {
            let cb = CanonicalBytes::new(&value).unwrap();
            let parsed: Value = serde_json::from_slice(cb.as_bytes()).unwrap();
            prop_assert_eq!(parsed, value);
        }

        #[test]
        fn canonicalization_is_idempotent(value in json_value()) {
            let once = CanonicalBytes::new(&value).unwrap();
            let reparsed: Value = serde_json::from_slice(once.as_bytes()).unwrap();
            let twice = CanonicalBytes::new(&reparsed).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
