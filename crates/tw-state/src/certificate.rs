//! # Certificates
//!
//! A certificate's `hash` is the SHA-256 of the RFC 8785 canonical form of
//! its payload. Identical payloads always hash identically, whatever key
//! order or whitespace the uploader used.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tw_core::{sha256_hex, CanonicalBytes, CanonicalizationError, CertificateId, JobId, NistCategory};
use tw_crypto::{SignerDetails, VerificationOutcome};

/// Verification state of a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    /// Signature, chain, and validity window all passed.
    Verified,
    /// At least one verification check failed.
    Invalid,
    /// No detached signature was supplied.
    Pending,
}

wire_enum!(CertificateStatus, "certificate status", {
    Verified => "VERIFIED",
    Invalid => "INVALID",
    Pending => "PENDING",
});

impl CertificateStatus {
    /// Status for an optional verification verdict.
    pub fn from_outcome(outcome: Option<&VerificationOutcome>) -> Self {
        match outcome {
            None => Self::Pending,
            Some(o) if o.valid => Self::Verified,
            Some(_) => Self::Invalid,
        }
    }
}

/// References to artifact files stored outside the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateArtifacts {
    /// Rendered PDF.
    pub pdf_ref: Option<String>,
    /// JSON document.
    pub json_ref: Option<String>,
    /// Detached PKCS#7 signature.
    pub pkcs7_ref: Option<String>,
}

/// A signed or verifiable wipe attestation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    /// Unique identifier.
    pub id: CertificateId,
    /// Producing job; `None` for standalone uploads.
    pub job_id: Option<JobId>,
    /// Declared assurance level.
    pub nist_category: Option<NistCategory>,
    /// The certificate document.
    pub payload: Value,
    /// Lowercase hex SHA-256 of the canonical payload.
    pub hash: String,
    /// Verification state.
    pub status: CertificateStatus,
    /// Signer certificate details, when a signer was found.
    pub ca_details: Option<SignerDetails>,
    /// Whether the signer chain was checked against a CA bundle.
    pub chain_checked: bool,
    /// Verification failure messages.
    pub verification_errors: Vec<String>,
    /// Artifact file references.
    pub artifacts: CertificateArtifacts,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Certificate {
    /// Build a certificate, hashing its canonical payload and recording
    /// the verification verdict (if a signature was checked).
    pub fn issue(
        job_id: Option<JobId>,
        nist_category: Option<NistCategory>,
        payload: Value,
        outcome: Option<&VerificationOutcome>,
        artifacts: CertificateArtifacts,
        now: DateTime<Utc>,
    ) -> Result<Self, CanonicalizationError> {
        let hash = content_hash(&payload)?;
        Ok(Self {
            id: CertificateId::new(),
            job_id,
            nist_category,
            payload,
            hash,
            status: CertificateStatus::from_outcome(outcome),
            ca_details: outcome.and_then(|o| o.signer.clone()),
            chain_checked: outcome.is_some_and(|o| o.chain_checked),
            verification_errors: outcome.map(|o| o.errors.clone()).unwrap_or_default(),
            artifacts,
            created_at: now,
        })
    }
}

/// Content hash of a certificate payload.
pub fn content_hash(payload: &Value) -> Result<String, CanonicalizationError> {
    Ok(sha256_hex(&CanonicalBytes::from_object(payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unsigned_certificate_is_pending() {
        let cert = Certificate::issue(
            None,
            Some(NistCategory::Clear),
            json!({"device": "x"}),
            None,
            CertificateArtifacts::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(cert.status, CertificateStatus::Pending);
        assert!(cert.ca_details.is_none());
        assert!(!cert.chain_checked);
        assert_eq!(cert.hash.len(), 64);
    }

    #[test]
    fn hash_ignores_key_order() {
        let a = content_hash(&json!({"b": 1, "a": {"y": 2, "x": 3}})).unwrap();
        let b = content_hash(&json!({"a": {"x": 3, "y": 2}, "b": 1})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn non_object_payload_rejected() {
        assert!(content_hash(&json!([1, 2, 3])).is_err());
    }
}
