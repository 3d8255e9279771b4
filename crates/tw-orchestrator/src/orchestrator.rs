//! # Job Orchestrator
//!
//! [`JobOrchestrator`] is the single entry point for every externally
//! triggered operation. It owns no mutable state: the store and the task
//! queue are the only coordination points, so any number of orchestrators
//! may run side by side over the same backends.
//!
//! Operations are split by concern:
//!
//! - users and agents (this module)
//! - job lifecycle and agent polling (`jobs.rs`)
//! - results, certificates, and anchors (`certificates.rs`)
//! - partners and deliveries (`deliveries.rs`)
//!
//! Validation and authorization run before any write. Audit events are
//! recorded after the write they describe; a failing audit sink is logged
//! and never fails the operation.

use std::sync::Arc;

use chrono::Utc;
use tw_anchor::AnchorService;
use tw_core::AgentId;
use tw_crypto::Pkcs7Verifier;
use tw_delivery::DeliveryService;
use tw_state::{Actor, Agent, AgentStatus, AgentSummary, NewAgent, Role, User};
use tw_store::{record_or_log, AuditEvent, AuditEventKind, AuditSink, JobStore};

use crate::error::OrchestratorError;

/// Coordinates jobs, agents, certificates, anchors, and deliveries.
#[derive(Clone)]
pub struct JobOrchestrator {
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) verifier: Arc<Pkcs7Verifier>,
    pub(crate) anchors: AnchorService,
    pub(crate) deliveries: DeliveryService,
    pub(crate) audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("anchors", &self.anchors)
            .field("deliveries", &self.deliveries)
            .field("trust_loaded", &self.verifier.trust_store().is_loaded())
            .finish_non_exhaustive()
    }
}

impl JobOrchestrator {
    /// Wire the orchestrator to its collaborators.
    pub fn new(
        store: Arc<dyn JobStore>,
        verifier: Arc<Pkcs7Verifier>,
        anchors: AnchorService,
        deliveries: DeliveryService,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            verifier,
            anchors,
            deliveries,
            audit,
        }
    }

    /// The job store.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// The certificate verifier.
    pub fn verifier(&self) -> &Pkcs7Verifier {
        &self.verifier
    }

    pub(crate) async fn audit(&self, event: AuditEvent) {
        record_or_log(self.audit.as_ref(), event).await;
    }

    // ── Users ───────────────────────────────────────────────────────

    /// Register a user. Admin only.
    pub async fn register_user(
        &self,
        actor: &Actor,
        email: &str,
        role: Role,
    ) -> Result<User, OrchestratorError> {
        if !actor.is_admin() {
            return Err(OrchestratorError::forbidden("only admins may register users"));
        }
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(OrchestratorError::validation(format!(
                "invalid email address {email:?}"
            )));
        }

        let now = Utc::now();
        let user = User::new(email.to_ascii_lowercase(), role, now);
        self.store.insert_user(&user).await?;

        self.audit(
            AuditEvent::new(AuditEventKind::UserCreated, "user", user.id, now)
                .by(actor.label())
                .with_metadata(serde_json::json!({ "role": role.as_str() })),
        )
        .await;
        Ok(user)
    }

    // ── Agents ──────────────────────────────────────────────────────

    /// Enroll an agent in ONLINE status. A duplicate name is a conflict.
    pub async fn enroll_agent(&self, new: NewAgent) -> Result<Agent, OrchestratorError> {
        if new.name.trim().is_empty() {
            return Err(OrchestratorError::validation("agent name must not be empty"));
        }

        let now = Utc::now();
        let agent = Agent::enroll(new, now);
        self.store.insert_agent(&agent).await?;
        tracing::info!(agent_id = %agent.id, name = %agent.name, "agent enrolled");

        self.audit(
            AuditEvent::new(AuditEventKind::AgentEnrolled, "agent", agent.id, now)
                .by(agent.id.to_string())
                .with_metadata(serde_json::json!({
                    "name": agent.name,
                    "os": agent.os,
                    "version": agent.version,
                })),
        )
        .await;
        Ok(agent)
    }

    /// Every agent with its active job count.
    pub async fn list_agents(&self) -> Result<Vec<AgentSummary>, OrchestratorError> {
        Ok(self.store.list_agents().await?)
    }

    /// Change an agent's status. Admin only.
    pub async fn set_agent_status(
        &self,
        actor: &Actor,
        agent_id: AgentId,
        status: AgentStatus,
    ) -> Result<Agent, OrchestratorError> {
        if !actor.is_admin() {
            return Err(OrchestratorError::forbidden(
                "only admins may change agent status",
            ));
        }
        let previous = self
            .store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("agent", agent_id))?
            .status;
        let agent = self.store.set_agent_status(agent_id, status).await?;

        self.audit(
            AuditEvent::new(AuditEventKind::AgentStatusChanged, "agent", agent_id, Utc::now())
                .by(actor.label())
                .with_metadata(serde_json::json!({
                    "from": previous.as_str(),
                    "to": status.as_str(),
                })),
        )
        .await;
        Ok(agent)
    }
}
