//! # tw-cli: the `trustwipe` binary
//!
//! ## Subcommands
//!
//! - `trustwipe serve`: anchor and delivery worker pools plus the
//!   health/metrics listener, configured from the environment.
//! - `trustwipe recommend`: policy engine recommendation as JSON.
//! - `trustwipe verify`: detached PKCS#7 verdict as JSON.
//! - `trustwipe hash`: canonical content hash of a JSON document.
//!
//! ```bash
//! DATABASE_URL=postgres://trustwipe@db/trustwipe \
//! CA_BUNDLE_PATH=/etc/trustwipe/ca-bundle.pem \
//! trustwipe serve
//! ```

pub mod commands;
pub mod config;
pub mod probes;
pub mod serve;
pub mod telemetry;

pub use config::{Config, ConfigError, LogFormat};
