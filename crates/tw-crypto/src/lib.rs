//! # tw-crypto: Wipe Certificate Signature Verification
//!
//! Verifies detached PKCS#7 / CMS signatures over uploaded certificate
//! documents and reports who signed them.
//!
//! - [`TrustStore`] holds the CA bundle loaded at startup.
//! - [`Pkcs7Verifier`] checks the signature, the signer chain, and the
//!   signer's validity window, collecting every failure it finds.
//!
//! ## Degraded Mode
//!
//! An empty trust store is allowed. Signatures are still checked but the
//! chain is not, and every outcome carries `chain_checked = false` so the
//! caller can tell the two modes apart.
//!
//! ## Crate Policy
//!
//! - No mocking of cryptographic operations in tests: fixtures are real
//!   OpenSSL-produced CMS structures.
//! - Verification failures are data ([`VerificationOutcome`]), not errors.

pub mod algorithms;
pub mod container;
pub mod error;
pub mod signer;
pub mod trust;
pub mod verify;

pub use algorithms::HashAlgorithm;
pub use error::CryptoError;
pub use signer::SignerDetails;
pub use trust::TrustStore;
pub use verify::{Pkcs7Verifier, VerificationFailure, VerificationOutcome};
