//! Enrolled execution agents.
//!
//! Agents are never hard-deleted; operators change their status instead.
//! `last_seen` moves on every work poll, whether or not a job was found.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tw_core::AgentId;

/// Operational state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    /// Polling and accepting work.
    Online,
    /// Not polling.
    Offline,
    /// Temporarily withdrawn by an operator.
    Maintenance,
    /// Permanently withdrawn; the record is kept for audit.
    Disabled,
}

wire_enum!(AgentStatus, "agent status", {
    Online => "ONLINE",
    Offline => "OFFLINE",
    Maintenance => "MAINTENANCE",
    Disabled => "DISABLED",
});

/// Enrollment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    /// Unique display name.
    pub name: String,
    /// Host operating system.
    pub os: String,
    /// Agent software version.
    pub version: String,
    /// Optional signing public key (PEM).
    #[serde(default)]
    pub public_key: Option<String>,
    /// Optional mTLS client certificate (PEM).
    #[serde(default)]
    pub mtls_cert: Option<String>,
}

/// An enrolled agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Unique identifier.
    pub id: AgentId,
    /// Unique display name.
    pub name: String,
    /// Host operating system.
    pub os: String,
    /// Agent software version.
    pub version: String,
    /// Optional signing public key (PEM).
    pub public_key: Option<String>,
    /// Optional mTLS client certificate (PEM).
    pub mtls_cert: Option<String>,
    /// Operational state.
    pub status: AgentStatus,
    /// Last work poll.
    pub last_seen: Option<DateTime<Utc>>,
    /// Enrollment time.
    pub enrolled_at: DateTime<Utc>,
}

impl Agent {
    /// Enroll a new agent as ONLINE.
    pub fn enroll(new: NewAgent, now: DateTime<Utc>) -> Self {
        Self {
            id: AgentId::new(),
            name: new.name,
            os: new.os,
            version: new.version,
            public_key: new.public_key,
            mtls_cert: new.mtls_cert,
            status: AgentStatus::Online,
            last_seen: None,
            enrolled_at: now,
        }
    }
}

/// An agent with its count of QUEUED or RUNNING jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    /// The agent.
    #[serde(flatten)]
    pub agent: Agent,
    /// Jobs still occupying the agent.
    pub active_jobs: u64,
}
