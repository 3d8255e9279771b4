//! # tw-policy: Sanitization Policy Engine
//!
//! Deterministically maps a medium, a wipe scope, and a NIST SP 800-88
//! category to a recommended wipe method, verification sampling rate, and
//! operator warnings.
//!
//! ## Architecture
//!
//! - [`recommend()`] is a pure function over a fixed decision table. It
//!   holds no state and is safe to call from any number of tasks.
//! - [`is_method_valid_for_media()`] is the allow-list used to reject
//!   physically inapplicable operator overrides (e.g. `CRYPTO_ERASE` on a
//!   rotating disk).
//! - [`resolve()`] combines both into the [`PolicySnapshot`] frozen onto a
//!   job at creation time.

pub mod recommend;
pub mod snapshot;

pub use recommend::{
    is_method_valid_for_media, recommend, valid_methods_for_media, Recommendation,
    VerificationRequirements,
};
pub use snapshot::{resolve, PolicyError, PolicyRequest, PolicySnapshot};
