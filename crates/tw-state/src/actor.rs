//! # Actors and Roles
//!
//! Every mutating operation names the [`Actor`] performing it. Users act
//! through a [`Role`]; agents act only on jobs assigned to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tw_core::{AgentId, UserId};

/// Privilege level of a human account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Full control, including overriding agent assignment.
    Admin,
    /// Creates and monitors jobs.
    Operator,
    /// Manages partner handoffs.
    PartnerLiaison,
}

wire_enum!(Role, "role", {
    Admin => "ADMIN",
    Operator => "OPERATOR",
    PartnerLiaison => "PARTNER_LIAISON",
});

/// A human account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier.
    pub id: UserId,
    /// Login email, unique.
    pub email: String,
    /// Privilege level.
    pub role: Role,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Register an account.
    pub fn new(email: impl Into<String>, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::new(),
            email: email.into(),
            role,
            created_at: now,
        }
    }

    /// This user as an acting principal.
    pub fn as_actor(&self) -> Actor {
        Actor::User {
            id: self.id,
            role: self.role,
        }
    }
}

/// The authenticated principal behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    /// A human account.
    User {
        /// Account identifier.
        id: UserId,
        /// Account role.
        role: Role,
    },
    /// An enrolled agent.
    Agent {
        /// Agent identifier.
        id: AgentId,
    },
}

impl Actor {
    /// Whether the actor is an admin user.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::User { role: Role::Admin, .. })
    }

    /// Whether the actor may create wipe jobs.
    pub fn can_create_jobs(&self) -> bool {
        matches!(
            self,
            Self::User {
                role: Role::Admin | Role::Operator,
                ..
            }
        )
    }

    /// Whether the actor may create partner deliveries.
    pub fn can_manage_deliveries(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    /// The agent identity, if the actor is an agent.
    pub fn agent_id(&self) -> Option<AgentId> {
        match self {
            Self::Agent { id } => Some(*id),
            Self::User { .. } => None,
        }
    }

    /// The user identity, if the actor is a user.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User { id, .. } => Some(*id),
            Self::Agent { .. } => None,
        }
    }

    /// Stable label for audit records, e.g. `user:<uuid>`.
    pub fn label(&self) -> String {
        match self {
            Self::User { id, .. } => id.to_string(),
            Self::Agent { id } => id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_capabilities() {
        let admin = User::new("a@example.com", Role::Admin, Utc::now()).as_actor();
        let operator = User::new("o@example.com", Role::Operator, Utc::now()).as_actor();
        let liaison = User::new("p@example.com", Role::PartnerLiaison, Utc::now()).as_actor();
        let agent = Actor::Agent { id: AgentId::new() };

        assert!(admin.is_admin() && admin.can_create_jobs());
        assert!(!operator.is_admin() && operator.can_create_jobs());
        assert!(!liaison.can_create_jobs() && liaison.can_manage_deliveries());
        assert!(!agent.can_create_jobs() && !agent.can_manage_deliveries());
        assert!(agent.agent_id().is_some() && agent.user_id().is_none());
    }

    #[test]
    fn actor_serializes_tagged() {
        let id = AgentId::new();
        let json = serde_json::to_value(Actor::Agent { id }).unwrap();
        assert_eq!(json["kind"], "AGENT");
        assert_eq!(json["id"], id.as_uuid().to_string());
        assert_eq!("partner_liaison".parse::<Role>().unwrap(), Role::PartnerLiaison);
    }
}
