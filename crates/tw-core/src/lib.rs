//! # tw-core: Foundational Types for TrustWipe
//!
//! Leaf crate of the TrustWipe workspace. Every other `tw-*` crate depends on
//! it; it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype identifiers.** `JobId`, `AgentId`, `CertificateId`, ... wrap a
//!    UUID so a delivery id can never be passed where a job id is expected.
//!
//! 2. **`CanonicalBytes` newtype.** Certificate content hashes flow through
//!    `CanonicalBytes::new()` (RFC 8785). Two documents that differ only in
//!    key order or whitespace hash identically.
//!
//! 3. **`sha256_digest()` accepts only `&CanonicalBytes`.** A content hash
//!    over non-canonical bytes cannot be expressed.
//!
//! 4. **Closed sanitization vocabulary.** Media types, scopes, NIST
//!    categories, and wipe methods are exhaustive enums with stable
//!    SCREAMING_CASE wire names.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `tw-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod domain;
pub mod error;
pub mod identity;

pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, sha256_hex, ContentDigest, DigestAlgorithm};
pub use domain::{DeliveryMethod, MediaType, NistCategory, WipeMethod, WipeScope};
pub use error::{CanonicalizationError, ParseEnumError};
pub use identity::{
    AgentId, AssetId, CertificateId, DeliveryId, JobId, PartnerId, ResultId, TaskId, UserId,
};
