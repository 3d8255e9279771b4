//! # Error Types
//!
//! Errors shared by every crate that touches canonical bytes or parses the
//! sanitization vocabulary from untyped input.

use thiserror::Error;

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// The input bytes are not a JSON document.
    #[error("document is not valid JSON: {0}")]
    InvalidJson(serde_json::Error),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Canonical output must be a JSON object at the top level.
    #[error("canonical document must be a JSON object, got {found}")]
    NotAnObject {
        /// JSON type that was found instead.
        found: &'static str,
    },
}

/// A wire name did not match any variant of a closed enum.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} value: {value:?}")]
pub struct ParseEnumError {
    /// Name of the enum being parsed (e.g. "media type").
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseEnumError {
    /// Rejection of `value` while parsing a `kind`.
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
