//! # PKCS#7 Verification
//!
//! Verifies a detached CMS signature over a certificate document.
//!
//! ## Checks
//!
//! 1. The signature decodes and embeds a signer certificate.
//! 2. The `messageDigest` signed attribute equals the document hash and
//!    the signer's signature over the signed attributes verifies.
//! 3. When the trust store is loaded, the signer chains to an anchor
//!    (through embedded intermediates if needed). Every intermediate must
//!    be a CA (`basicConstraints cA`, `keyCertSign` when key usage is
//!    present) and inside its own validity window.
//! 4. The signer certificate is inside its validity window.
//!
//! Checks 2-4 all run; every failure is reported, not just the first.
//! `valid` is true only when none failed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cms::signed_data::{SignedAttributes, SignerIdentifier, SignerInfo};
use der::asn1::{ObjectIdentifier, OctetString};
use der::{Decode, Encode};
use serde::Serialize;
use thiserror::Error;
use x509_cert::ext::pkix::{BasicConstraints, KeyUsage};
use x509_cert::Certificate;

use crate::algorithms::{verify_signature, HashAlgorithm};
use crate::container::SignedEnvelope;
use crate::error::CryptoError;
use crate::signer::SignerDetails;
use crate::trust::TrustStore;

/// `id-messageDigest` signed attribute (RFC 5652 §11.2).
const ID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

/// Longest issuer path walked before giving up.
pub const MAX_CHAIN_DEPTH: usize = 8;

/// One reason a signature was not accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    /// The CMS structure carries no usable signer certificate.
    #[error("No signer certificate found in PKCS#7 signature")]
    NoSignerCertificate,

    /// Digest or signature check failed.
    #[error("PKCS#7 signature verification failed")]
    SignatureInvalid,

    /// The signer does not chain to a trusted CA.
    #[error("Certificate chain verification failed: {reason}")]
    ChainInvalid {
        /// Why path building stopped.
        reason: String,
    },

    /// Verification time precedes the signer's `notBefore`.
    #[error("Certificate is not yet valid")]
    NotYetValid,

    /// Verification time follows the signer's `notAfter`.
    #[error("Certificate has expired")]
    Expired,

    /// The signature could not be decoded at all.
    #[error("PKCS#7 verification error: {reason}")]
    Malformed {
        /// Decoder message.
        reason: String,
    },
}

/// Verdict for one document/signature pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    /// True only when every check passed.
    pub valid: bool,
    /// False when the trust store was empty and the chain was not checked.
    pub chain_checked: bool,
    /// Signer identity, when a signer certificate was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer: Option<SignerDetails>,
    /// Human-readable failure messages.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Structured failures, parallel to `errors`.
    #[serde(skip)]
    pub failures: Vec<VerificationFailure>,
}

impl VerificationOutcome {
    fn from_failures(
        signer: Option<SignerDetails>,
        chain_checked: bool,
        failures: Vec<VerificationFailure>,
    ) -> Self {
        Self {
            valid: failures.is_empty(),
            chain_checked,
            signer,
            errors: failures.iter().map(ToString::to_string).collect(),
            failures,
        }
    }

    /// Whether a specific failure was recorded.
    pub fn has_failure(&self, predicate: impl Fn(&VerificationFailure) -> bool) -> bool {
        self.failures.iter().any(predicate)
    }
}

/// Detached PKCS#7 verifier bound to a trust store.
#[derive(Debug, Clone)]
pub struct Pkcs7Verifier {
    trust: Arc<TrustStore>,
}

impl Pkcs7Verifier {
    /// Create a verifier over `trust`.
    pub fn new(trust: Arc<TrustStore>) -> Self {
        Self { trust }
    }

    /// The trust store in use.
    pub fn trust_store(&self) -> &TrustStore {
        &self.trust
    }

    /// Verify `signature` over `document` at the current time.
    pub fn verify(&self, document: &[u8], signature: &[u8]) -> VerificationOutcome {
        self.verify_at(document, signature, Utc::now())
    }

    /// Verify `signature` over `document` as of `now`.
    pub fn verify_at(
        &self,
        document: &[u8],
        signature: &[u8],
        now: DateTime<Utc>,
    ) -> VerificationOutcome {
        let chain_checked = self.trust.is_loaded();
        let outcome = match self.evaluate(document, signature, now) {
            Ok(outcome) => outcome,
            Err(e) => VerificationOutcome::from_failures(
                None,
                chain_checked,
                vec![VerificationFailure::Malformed {
                    reason: e.to_string(),
                }],
            ),
        };
        tracing::debug!(
            valid = outcome.valid,
            chain_checked = outcome.chain_checked,
            errors = ?outcome.errors,
            "pkcs7 verification finished"
        );
        outcome
    }

    fn evaluate(
        &self,
        document: &[u8],
        signature: &[u8],
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome, CryptoError> {
        let envelope = SignedEnvelope::decode(signature)?;
        let chain_checked = self.trust.is_loaded();

        let Some(info) = envelope.signed_data.signer_infos.0.iter().next() else {
            return Err(CryptoError::MalformedSignature(
                "signature carries no signer information".to_string(),
            ));
        };
        let Some(signer_cert) = select_signer(info, &envelope.certificates) else {
            return Ok(VerificationOutcome::from_failures(
                None,
                chain_checked,
                vec![VerificationFailure::NoSignerCertificate],
            ));
        };

        let mut failures = Vec::new();

        if let Err(e) = check_signer_info(info, signer_cert, document) {
            tracing::debug!(error = %e, "signer info rejected");
            failures.push(VerificationFailure::SignatureInvalid);
        }

        if chain_checked {
            if let Err(reason) = self.check_chain(signer_cert, &envelope.certificates, now) {
                failures.push(VerificationFailure::ChainInvalid { reason });
            }
        } else {
            tracing::warn!("no CA certificates loaded, skipping chain validation");
        }

        let details = SignerDetails::from_certificate(signer_cert)?;
        if now < details.valid_from {
            failures.push(VerificationFailure::NotYetValid);
        }
        if now > details.valid_to {
            failures.push(VerificationFailure::Expired);
        }

        Ok(VerificationOutcome::from_failures(
            Some(details),
            chain_checked,
            failures,
        ))
    }

    fn check_chain(
        &self,
        leaf: &Certificate,
        embedded: &[Certificate],
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        let anchors = self.trust.anchors();
        let mut current = leaf;

        for _ in 0..MAX_CHAIN_DEPTH {
            if anchors.iter().any(|a| a == current || issued_by(current, a)) {
                return Ok(());
            }
            match embedded
                .iter()
                .find(|c| *c != current && issued_by(current, c))
            {
                Some(next) => {
                    check_intermediate(next, now)?;
                    current = next;
                }
                None => {
                    return Err("signer certificate is not issued by a trusted CA".to_string())
                }
            }
        }
        Err(format!("issuer path longer than {MAX_CHAIN_DEPTH} certificates"))
    }
}

/// An embedded issuer may only sign certificates if it is a CA that is
/// currently valid.
fn check_intermediate(cert: &Certificate, now: DateTime<Utc>) -> Result<(), String> {
    let details = SignerDetails::from_certificate(cert).map_err(|e| e.to_string())?;
    let tbs = &cert.tbs_certificate;

    let is_ca = match tbs.get::<BasicConstraints>() {
        Ok(Some((_, constraints))) => constraints.ca,
        Ok(None) => false,
        Err(e) => return Err(format!("{}: unreadable basicConstraints: {e}", details.subject)),
    };
    if !is_ca {
        return Err(format!("{} is not a CA certificate", details.subject));
    }
    match tbs.get::<KeyUsage>() {
        Ok(Some((_, usage))) if !usage.key_cert_sign() => {
            return Err(format!(
                "{} key usage does not permit certificate signing",
                details.subject
            ))
        }
        Ok(_) => {}
        Err(e) => return Err(format!("{}: unreadable keyUsage: {e}", details.subject)),
    }
    if !details.is_valid_at(now) {
        return Err(format!(
            "intermediate {} is outside its validity window",
            details.subject
        ));
    }
    Ok(())
}

/// Locate the signer certificate by issuer and serial, falling back to
/// the first embedded certificate.
fn select_signer<'a>(info: &SignerInfo, certs: &'a [Certificate]) -> Option<&'a Certificate> {
    if let SignerIdentifier::IssuerAndSerialNumber(isn) = &info.sid {
        let matched = certs.iter().find(|c| {
            c.tbs_certificate.issuer == isn.issuer
                && c.tbs_certificate.serial_number == isn.serial_number
        });
        if matched.is_some() {
            return matched;
        }
    }
    certs.first()
}

fn check_signer_info(
    info: &SignerInfo,
    signer: &Certificate,
    document: &[u8],
) -> Result<(), CryptoError> {
    let digest = HashAlgorithm::from_oid(&info.digest_alg.oid)?;

    let signed_bytes = match &info.signed_attrs {
        Some(attrs) => {
            let claimed = message_digest(attrs)?;
            if claimed != digest.digest(document) {
                return Err(CryptoError::DigestMismatch);
            }
            attrs.to_der()?
        }
        None => document.to_vec(),
    };

    verify_signature(
        &signer.tbs_certificate.subject_public_key_info,
        &info.signature_algorithm.oid,
        Some(digest),
        &signed_bytes,
        info.signature.as_bytes(),
    )
}

fn message_digest(attrs: &SignedAttributes) -> Result<Vec<u8>, CryptoError> {
    let value = attrs
        .iter()
        .find(|attr| attr.oid == ID_MESSAGE_DIGEST)
        .and_then(|attr| attr.values.iter().next())
        .ok_or_else(|| {
            CryptoError::MalformedSignature("signed attributes lack messageDigest".to_string())
        })?;
    let octets = OctetString::from_der(&value.to_der()?)?;
    Ok(octets.as_bytes().to_vec())
}

/// Whether `issuer` signed `cert`.
fn issued_by(cert: &Certificate, issuer: &Certificate) -> bool {
    if cert.tbs_certificate.issuer != issuer.tbs_certificate.subject {
        return false;
    }
    let Ok(tbs) = cert.tbs_certificate.to_der() else {
        return false;
    };
    verify_signature(
        &issuer.tbs_certificate.subject_public_key_info,
        &cert.signature_algorithm.oid,
        None,
        &tbs,
        cert.signature.raw_bytes(),
    )
    .is_ok()
}
