//! # Identifier Newtypes
//!
//! UUID-backed identifiers for every persisted TrustWipe entity.
//!
//! ## Security Invariant
//!
//! Type-level distinction between identifier namespaces prevents an agent
//! from substituting, say, a delivery id where a job id is expected when
//! the orchestrator checks job assignment.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID (e.g. one read back from the database).
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, ":")).unwrap_or(s);
                Uuid::parse_str(raw).map(Self)
            }
        }
    };
}

uuid_identifier!(
    /// A sanitization job.
    JobId, "job"
);
uuid_identifier!(
    /// An enrolled execution agent.
    AgentId, "agent"
);
uuid_identifier!(
    /// A physical device record.
    AssetId, "asset"
);
uuid_identifier!(
    /// A signed/verifiable wipe certificate.
    CertificateId, "certificate"
);
uuid_identifier!(
    /// The ingested result of a finished job.
    ResultId, "result"
);
uuid_identifier!(
    /// A requested certificate handoff to a partner.
    DeliveryId, "delivery"
);
uuid_identifier!(
    /// A recycler/consumer partner endpoint.
    PartnerId, "partner"
);
uuid_identifier!(
    /// An operator, admin, or partner-liaison account.
    UserId, "user"
);
uuid_identifier!(
    /// A queued unit of background work.
    TaskId, "task"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_namespace_prefix() {
        let id = JobId::new();
        assert_eq!(id.to_string(), format!("job:{}", id.as_uuid()));
        let agent = AgentId::new();
        assert!(agent.to_string().starts_with("agent:"));
    }

    #[test]
    fn test_parse_with_and_without_prefix() {
        let id = DeliveryId::new();
        let bare = id.as_uuid().to_string();
        assert_eq!(bare.parse::<DeliveryId>().unwrap(), id);
        assert_eq!(id.to_string().parse::<DeliveryId>().unwrap(), id);
        assert!("delivery:not-a-uuid".parse::<DeliveryId>().is_err());
    }

    #[test]
    fn test_serializes_as_bare_uuid() {
        let id = CertificateId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::json!(id.as_uuid().to_string()));
        let back: CertificateId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }
}
