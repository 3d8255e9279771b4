//! # tw-state: Job State Machine and Entity Records
//!
//! ## State Machine
//!
//! - **WipeJob** (`job.rs`): `QUEUED → RUNNING → {SUCCEEDED, FAILED,
//!   CANCELLED}`. Terminal states accept no further update.
//!
//! ## Records
//!
//! - **Agent** (`agent.rs`): enrolled execution endpoint, soft status only.
//! - **Asset** (`asset.rs`): physical device with its media type.
//! - **WipeResult** (`result.rs`): one per finished job.
//! - **Certificate** (`certificate.rs`): content-addressed attestation
//!   with its verification verdict.
//! - **BlockchainRecord** (`anchor.rs`): ledger anchor tracking row.
//! - **Partner** / **Delivery** (`delivery.rs`): certificate handoffs.
//! - **User** / **Actor** (`actor.rs`): who may do what.
//!
//! ## Design
//!
//! Records carry their own transition helpers so every store backend
//! applies identical rules. Persistence lives in `tw-store`.

/// Declares `as_str`, `Display`, and case-insensitive `FromStr` for a
/// unit-variant status enum with SCREAMING_SNAKE_CASE wire names.
macro_rules! wire_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            /// Wire name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = tw_core::ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_uppercase().as_str() {
                    $($wire => Ok(Self::$variant),)+
                    _ => Err(tw_core::ParseEnumError::new($kind, s)),
                }
            }
        }
    };
}

pub mod actor;
pub mod agent;
pub mod anchor;
pub mod asset;
pub mod certificate;
pub mod delivery;
pub mod job;
pub mod result;

pub use actor::{Actor, Role, User};
pub use agent::{Agent, AgentStatus, AgentSummary, NewAgent};
pub use anchor::{AnchorStatus, BlockchainRecord};
pub use asset::Asset;
pub use certificate::{Certificate, CertificateArtifacts, CertificateStatus};
pub use delivery::{Delivery, DeliveryStatus, NewPartner, Partner};
pub use job::{JobError, JobStatus, JobTransitionRecord, NewJob, StatusUpdate, WipeJob};
pub use result::{ResultArtifacts, ResultDocument, WipeResult};
