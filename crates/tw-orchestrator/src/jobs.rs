//! # Job Lifecycle
//!
//! Creation, agent polling, status updates, and job queries.
//!
//! ## Concurrency
//!
//! - Polling is a single atomic claim in the store; two polls for the same
//!   agent never return the same job.
//! - A status update authorizes against the job as persisted at the time
//!   of the call, then writes with compare-and-set on the status it
//!   observed. An update racing another one loses with a conflict instead
//!   of overwriting it.

use chrono::Utc;
use serde::Deserialize;
use tw_core::{AgentId, AssetId, JobId, MediaType, WipeScope};
use tw_policy::PolicyRequest;
use tw_state::{
    Actor, Asset, JobStatus, JobTransitionRecord, NewJob, StatusUpdate, WipeJob,
};
use tw_store::{AuditEvent, AuditEventKind, JobFilter, Page};

use crate::error::OrchestratorError;
use crate::orchestrator::JobOrchestrator;

const RESOURCE: &str = "wipe_job";

/// Medium assumed when a job names no asset.
pub const DEFAULT_MEDIA: MediaType = MediaType::Hdd;

/// Device details for an asset registered together with its job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDetails {
    pub media_type: MediaType,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub capacity_bytes: Option<i64>,
}

/// Which asset a new job targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum JobAsset {
    /// No asset record; the policy is resolved for [`DEFAULT_MEDIA`].
    #[default]
    Unspecified,
    /// A previously registered asset.
    Existing(AssetId),
    /// Register this device and bind it to the job.
    Register(AssetDetails),
}

/// Input of [`JobOrchestrator::create_job`].
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub asset: JobAsset,
    pub scope: WipeScope,
    /// Drive path or folder the agent wipes.
    pub target: String,
    pub policy: PolicyRequest,
    pub assigned_agent_id: Option<AgentId>,
    /// Explicit acknowledgement that the operation destroys data.
    pub confirm: bool,
}

impl JobOrchestrator {
    /// Create a QUEUED job with a frozen policy snapshot.
    pub async fn create_job(
        &self,
        actor: &Actor,
        request: CreateJobRequest,
    ) -> Result<WipeJob, OrchestratorError> {
        if !request.confirm {
            return Err(OrchestratorError::validation(
                "confirmation required for destructive operation",
            ));
        }
        let requested_by = match actor.user_id() {
            Some(id) if actor.can_create_jobs() => id,
            _ => {
                return Err(OrchestratorError::forbidden(
                    "only admins and operators may create wipe jobs",
                ))
            }
        };
        if request.target.trim().is_empty() {
            return Err(OrchestratorError::validation("target must not be empty"));
        }
        if let Some(agent_id) = request.assigned_agent_id {
            if self.store.get_agent(agent_id).await?.is_none() {
                return Err(OrchestratorError::not_found("agent", agent_id));
            }
        }

        let now = Utc::now();
        let (asset_id, media, new_asset) = match request.asset {
            JobAsset::Unspecified => (None, DEFAULT_MEDIA, None),
            JobAsset::Existing(id) => {
                let asset = self
                    .store
                    .get_asset(id)
                    .await?
                    .ok_or_else(|| OrchestratorError::not_found("asset", id))?;
                (Some(asset.id), asset.media_type, None)
            }
            JobAsset::Register(details) => {
                let asset = Asset::new(
                    details.media_type,
                    details.model,
                    details.serial_number,
                    details.capacity_bytes,
                    now,
                );
                (Some(asset.id), asset.media_type, Some(asset))
            }
        };

        let policy_snapshot = tw_policy::resolve(media, request.scope, &request.policy)?;

        let job = WipeJob::new(
            NewJob {
                asset_id,
                scope: request.scope,
                target: request.target,
                requested_by,
                assigned_agent_id: request.assigned_agent_id,
                policy_snapshot,
            },
            now,
        );
        self.store.insert_job(&job, new_asset.as_ref()).await?;

        tracing::info!(
            job_id = %job.id,
            method = %job.method,
            nist_category = %job.nist_category,
            media = %media,
            "wipe job created"
        );
        self.audit(
            AuditEvent::new(AuditEventKind::WipeJobCreated, RESOURCE, job.id, now)
                .by(actor.label())
                .with_metadata(serde_json::json!({
                    "target": job.target,
                    "method": job.method.as_str(),
                    "nistCategory": job.nist_category.as_str(),
                    "methodOverridden": job.policy_snapshot.method_overridden,
                })),
        )
        .await;
        Ok(job)
    }

    /// Claim the oldest QUEUED job assigned to `agent`.
    ///
    /// The agent's last-seen time is refreshed whether or not a job is
    /// returned. Only the QUEUED status filter is supported.
    pub async fn poll(
        &self,
        agent: AgentId,
        status: JobStatus,
    ) -> Result<Option<WipeJob>, OrchestratorError> {
        if status != JobStatus::Queued {
            return Err(OrchestratorError::validation(format!(
                "agents may only poll for QUEUED jobs, got {status}"
            )));
        }
        let now = Utc::now();
        self.store.touch_agent(agent, now).await?;
        let job = self.store.claim_next_job(agent, now).await?;
        if let Some(job) = &job {
            tracing::debug!(job_id = %job.id, agent_id = %agent, "job claimed");
        }
        Ok(job)
    }

    /// Apply a status update from the assigned agent or an admin.
    pub async fn update_status(
        &self,
        actor: &Actor,
        job_id: JobId,
        update: StatusUpdate,
    ) -> Result<WipeJob, OrchestratorError> {
        let mut job = self.load_job(job_id).await?;
        authorize_job_actor(actor, &job)?;

        let observed = job.status;
        let now = Utc::now();
        let Some(transition) = job.apply(&update, now)? else {
            return Ok(job);
        };
        self.store.update_job(&job, observed).await?;

        if transition.is_state_change() {
            tracing::info!(
                job_id = %job.id,
                from = %transition.from_state,
                to = %transition.to_state,
                "job transitioned"
            );
            metrics::counter!(
                "trustwipe_job_transitions_total",
                "to" => transition.to_state.as_str()
            )
            .increment(1);
            if let Some(kind) = transition_event(&transition) {
                self.audit(
                    AuditEvent::new(kind, RESOURCE, job.id, now)
                        .by(actor.label())
                        .with_metadata(serde_json::json!({
                            "from": transition.from_state.as_str(),
                            "to": transition.to_state.as_str(),
                            "error": job.last_error,
                        })),
                )
                .await;
            }
        } else {
            tracing::debug!(job_id = %job.id, progress = ?job.progress, "job progress");
        }
        Ok(job)
    }

    /// Fetch a job.
    pub async fn get_job(&self, job_id: JobId) -> Result<WipeJob, OrchestratorError> {
        self.load_job(job_id).await
    }

    /// Newest-first page of jobs.
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Page<WipeJob>, OrchestratorError> {
        Ok(self.store.list_jobs(filter).await?)
    }

    pub(crate) async fn load_job(&self, job_id: JobId) -> Result<WipeJob, OrchestratorError> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("job", job_id))
    }
}

/// Only the assigned agent or an admin may act on a job.
pub(crate) fn authorize_job_actor(actor: &Actor, job: &WipeJob) -> Result<(), OrchestratorError> {
    if actor.is_admin() || actor.agent_id().is_some_and(|agent| job.is_assigned_to(agent)) {
        return Ok(());
    }
    Err(OrchestratorError::forbidden(format!(
        "{} is not authorized to update job {}",
        actor.label(),
        job.id
    )))
}

fn transition_event(transition: &JobTransitionRecord) -> Option<AuditEventKind> {
    match transition.to_state {
        JobStatus::Running => Some(AuditEventKind::WipeJobStarted),
        JobStatus::Succeeded => Some(AuditEventKind::WipeJobCompleted),
        JobStatus::Failed => Some(AuditEventKind::WipeJobFailed),
        JobStatus::Cancelled => Some(AuditEventKind::WipeJobCancelled),
        JobStatus::Queued => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_core::UserId;
    use tw_state::{Role, User};

    fn job_for(agent: Option<AgentId>) -> WipeJob {
        let snapshot = tw_policy::resolve(
            MediaType::Hdd,
            WipeScope::Drive,
            &PolicyRequest::for_category(tw_core::NistCategory::Clear),
        )
        .unwrap();
        WipeJob::new(
            NewJob {
                asset_id: None,
                scope: WipeScope::Drive,
                target: "/dev/sda".into(),
                requested_by: UserId::new(),
                assigned_agent_id: agent,
                policy_snapshot: snapshot,
            },
            Utc::now(),
        )
    }

    #[test]
    fn assigned_agent_and_admin_are_authorized() {
        let agent = AgentId::new();
        let job = job_for(Some(agent));
        assert!(authorize_job_actor(&Actor::Agent { id: agent }, &job).is_ok());
        let admin = User::new("root@example.com", Role::Admin, Utc::now()).as_actor();
        assert!(authorize_job_actor(&admin, &job).is_ok());
    }

    #[test]
    fn other_agents_and_operators_are_refused() {
        let job = job_for(Some(AgentId::new()));
        let stranger = Actor::Agent { id: AgentId::new() };
        let err = authorize_job_actor(&stranger, &job).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        let operator = User::new("op@example.com", Role::Operator, Utc::now()).as_actor();
        assert!(authorize_job_actor(&operator, &job).is_err());
    }

    #[test]
    fn unassigned_job_accepts_only_admin() {
        let job = job_for(None);
        assert!(authorize_job_actor(&Actor::Agent { id: AgentId::new() }, &job).is_err());
    }

    #[test]
    fn only_state_changes_into_tracked_states_are_audited() {
        let rec = |from, to| JobTransitionRecord {
            job_id: JobId::new(),
            from_state: from,
            to_state: to,
            timestamp: Utc::now(),
        };
        assert_eq!(
            transition_event(&rec(JobStatus::Queued, JobStatus::Running)),
            Some(AuditEventKind::WipeJobStarted)
        );
        assert_eq!(
            transition_event(&rec(JobStatus::Running, JobStatus::Cancelled)),
            Some(AuditEventKind::WipeJobCancelled)
        );
        assert_eq!(transition_event(&rec(JobStatus::Queued, JobStatus::Queued)), None);
    }
}
