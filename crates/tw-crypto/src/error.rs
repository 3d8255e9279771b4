//! Error types for CMS decoding, key handling, and trust store loading.

use thiserror::Error;

/// Failures below the level of a verification verdict.
///
/// [`crate::Pkcs7Verifier`] folds these into a
/// [`crate::VerificationOutcome`]; they only surface directly from the
/// lower-level helpers and from trust store loading.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The signature blob could not be decoded as a CMS signed-data value.
    #[error("{0}")]
    MalformedSignature(String),

    /// ASN.1 decoding or encoding failed.
    #[error("ASN.1 error: {0}")]
    Der(#[from] der::Error),

    /// A signature or digest algorithm this crate does not implement.
    #[error("unsupported algorithm {oid}")]
    UnsupportedAlgorithm {
        /// Dotted OID of the algorithm.
        oid: String,
    },

    /// A public key could not be parsed for the declared algorithm.
    #[error("invalid public key: {0}")]
    InvalidKey(String),

    /// The signature did not verify under the given key.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// The signed `messageDigest` attribute does not match the document.
    #[error("message digest attribute does not match the document")]
    DigestMismatch,

    /// The CA bundle could not be read or contained no certificates.
    #[error("failed to load CA bundle {path}: {reason}")]
    TrustStore {
        /// Bundle location.
        path: String,
        /// What went wrong.
        reason: String,
    },
}
