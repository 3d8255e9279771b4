//! # In-Memory Store
//!
//! [`MemoryStore`] keeps every table behind one `parking_lot::RwLock`, so
//! uniqueness checks and the job claim are atomic across tables. The lock
//! is never held across an `.await`: every trait method takes it, does its
//! work synchronously, and releases it before returning.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tw_core::{AgentId, AssetId, CertificateId, DeliveryId, JobId, PartnerId, UserId};
use tw_state::{
    Agent, AgentStatus, AgentSummary, Asset, BlockchainRecord, Certificate, Delivery, JobStatus,
    Partner, User, WipeJob, WipeResult,
};

use crate::error::StoreError;
use crate::repository::{CertificateFilter, JobFilter, JobStore, Page};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    agents: HashMap<AgentId, Agent>,
    assets: HashMap<AssetId, Asset>,
    jobs: HashMap<JobId, WipeJob>,
    results: HashMap<JobId, WipeResult>,
    certificates: HashMap<CertificateId, Certificate>,
    anchors: HashMap<JobId, BlockchainRecord>,
    partners: HashMap<PartnerId, Partner>,
    deliveries: HashMap<DeliveryId, Delivery>,
}

/// Process-local [`JobStore`] with the same semantics as the PostgreSQL
/// backend.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub fn job_count(&self) -> usize {
        self.tables.read().jobs.len()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.tables.read();
        f.debug_struct("MemoryStore")
            .field("jobs", &t.jobs.len())
            .field("agents", &t.agents.len())
            .field("certificates", &t.certificates.len())
            .finish()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        if t.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::conflict(format!(
                "user email {} already registered",
                user.email
            )));
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn insert_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        if t.agents.values().any(|a| a.name == agent.name) {
            return Err(StoreError::conflict(format!(
                "agent name {} already enrolled",
                agent.name
            )));
        }
        t.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>, StoreError> {
        Ok(self.tables.read().agents.get(&id).cloned())
    }

    async fn list_agents(&self) -> Result<Vec<AgentSummary>, StoreError> {
        let t = self.tables.read();
        let mut active: HashMap<AgentId, u64> = HashMap::new();
        for job in t.jobs.values().filter(|j| j.status.is_active()) {
            if let Some(agent) = job.assigned_agent_id {
                *active.entry(agent).or_default() += 1;
            }
        }
        let mut agents: Vec<AgentSummary> = t
            .agents
            .values()
            .map(|a| AgentSummary {
                agent: a.clone(),
                active_jobs: active.get(&a.id).copied().unwrap_or(0),
            })
            .collect();
        agents.sort_by(|a, b| {
            a.agent
                .enrolled_at
                .cmp(&b.agent.enrolled_at)
                .then(a.agent.id.cmp(&b.agent.id))
        });
        Ok(agents)
    }

    async fn set_agent_status(
        &self,
        id: AgentId,
        status: AgentStatus,
    ) -> Result<Agent, StoreError> {
        let mut t = self.tables.write();
        let agent = t
            .agents
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("agent", id))?;
        agent.status = status;
        Ok(agent.clone())
    }

    async fn touch_agent(&self, id: AgentId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        let agent = t
            .agents
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("agent", id))?;
        agent.last_seen = Some(now);
        Ok(())
    }

    async fn get_asset(&self, id: AssetId) -> Result<Option<Asset>, StoreError> {
        Ok(self.tables.read().assets.get(&id).cloned())
    }

    async fn insert_job(
        &self,
        job: &WipeJob,
        new_asset: Option<&Asset>,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        if t.jobs.contains_key(&job.id) {
            return Err(StoreError::conflict(format!("job {} already exists", job.id)));
        }
        if let Some(asset) = new_asset {
            if t.assets.contains_key(&asset.id) {
                return Err(StoreError::conflict(format!("asset {} already exists", asset.id)));
            }
            t.assets.insert(asset.id, asset.clone());
        }
        t.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<WipeJob>, StoreError> {
        Ok(self.tables.read().jobs.get(&id).cloned())
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Page<WipeJob>, StoreError> {
        let t = self.tables.read();
        let mut matching: Vec<&WipeJob> = t.jobs.values().filter(|j| filter.matches(j)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let limit = filter.effective_limit();
        let items = matching
            .iter()
            .skip(filter.offset as usize)
            .take(limit as usize)
            .map(|j| (*j).clone())
            .collect();
        Ok(Page {
            items,
            total: matching.len() as u64,
            limit,
            offset: filter.offset,
        })
    }

    async fn claim_next_job(
        &self,
        agent: AgentId,
        now: DateTime<Utc>,
    ) -> Result<Option<WipeJob>, StoreError> {
        let mut t = self.tables.write();
        let next = t
            .jobs
            .values()
            .filter(|j| {
                j.assigned_agent_id == Some(agent)
                    && j.status == JobStatus::Queued
                    && j.claimed_at.is_none()
            })
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            t.jobs.get_mut(&id).map(|job| {
                job.claimed_at = Some(now);
                job.updated_at = now;
                job.clone()
            })
        }))
    }

    async fn update_job(&self, job: &WipeJob, expected: JobStatus) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        let stored = t
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| StoreError::not_found("job", job.id))?;
        if stored.status != expected {
            return Err(StoreError::conflict(format!(
                "job {} is {} (expected {expected})",
                job.id, stored.status
            )));
        }
        // Identity, request, and policy columns are write-once.
        stored.status = job.status;
        stored.progress = job.progress;
        stored.last_error = job.last_error.clone();
        stored.run_log_sha256 = job.run_log_sha256.clone();
        stored.claimed_at = job.claimed_at;
        stored.started_at = job.started_at;
        stored.finished_at = job.finished_at;
        stored.updated_at = job.updated_at;
        Ok(())
    }

    async fn insert_result(
        &self,
        result: &WipeResult,
        certificate: &Certificate,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        if t.results.contains_key(&result.job_id) {
            return Err(StoreError::conflict(format!(
                "result for job {} already ingested",
                result.job_id
            )));
        }
        t.results.insert(result.job_id, result.clone());
        t.certificates.insert(certificate.id, certificate.clone());
        Ok(())
    }

    async fn get_result_for_job(&self, job_id: JobId) -> Result<Option<WipeResult>, StoreError> {
        Ok(self.tables.read().results.get(&job_id).cloned())
    }

    async fn insert_certificate(&self, cert: &Certificate) -> Result<(), StoreError> {
        self.tables
            .write()
            .certificates
            .insert(cert.id, cert.clone());
        Ok(())
    }

    async fn get_certificate(&self, id: CertificateId) -> Result<Option<Certificate>, StoreError> {
        Ok(self.tables.read().certificates.get(&id).cloned())
    }

    async fn list_certificates(
        &self,
        filter: &CertificateFilter,
    ) -> Result<Vec<Certificate>, StoreError> {
        let t = self.tables.read();
        let mut certs: Vec<Certificate> = t
            .certificates
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        certs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(certs)
    }

    async fn upsert_anchor(&self, record: &BlockchainRecord) -> Result<(), StoreError> {
        self.tables
            .write()
            .anchors
            .insert(record.job_id, record.clone());
        Ok(())
    }

    async fn delete_anchor(&self, job_id: JobId) -> Result<(), StoreError> {
        self.tables.write().anchors.remove(&job_id);
        Ok(())
    }

    async fn get_anchor(&self, job_id: JobId) -> Result<Option<BlockchainRecord>, StoreError> {
        Ok(self.tables.read().anchors.get(&job_id).cloned())
    }

    async fn find_anchor_by_tx(
        &self,
        tx_hash: &str,
    ) -> Result<Option<BlockchainRecord>, StoreError> {
        Ok(self
            .tables
            .read()
            .anchors
            .values()
            .find(|r| {
                r.tx_hash
                    .as_deref()
                    .is_some_and(|tx| tx.eq_ignore_ascii_case(tx_hash))
            })
            .cloned())
    }

    async fn insert_partner(&self, partner: &Partner) -> Result<(), StoreError> {
        self.tables
            .write()
            .partners
            .insert(partner.id, partner.clone());
        Ok(())
    }

    async fn get_partner(&self, id: PartnerId) -> Result<Option<Partner>, StoreError> {
        Ok(self.tables.read().partners.get(&id).cloned())
    }

    async fn insert_delivery(&self, delivery: &Delivery) -> Result<(), StoreError> {
        self.tables
            .write()
            .deliveries
            .insert(delivery.id, delivery.clone());
        Ok(())
    }

    async fn get_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>, StoreError> {
        Ok(self.tables.read().deliveries.get(&id).cloned())
    }

    async fn save_delivery(&self, delivery: &Delivery) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        let stored = t
            .deliveries
            .get_mut(&delivery.id)
            .ok_or_else(|| StoreError::not_found("delivery", delivery.id))?;
        stored.status = delivery.status;
        stored.attempts = delivery.attempts;
        stored.last_error = delivery.last_error.clone();
        stored.updated_at = delivery.updated_at;
        stored.delivered_at = delivery.delivered_at;
        Ok(())
    }
}
