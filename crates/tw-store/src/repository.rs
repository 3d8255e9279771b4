//! # Repository Trait
//!
//! [`JobStore`] is the single persistence seam of the orchestrator and the
//! workers. Components receive an `Arc<dyn JobStore>` explicitly; nothing
//! reaches for a process-wide handle.
//!
//! ## Concurrency Contract
//!
//! - [`JobStore::claim_next_job`] is one atomic read-and-claim. Two
//!   concurrent calls for the same agent never return the same job.
//! - [`JobStore::update_job`] is compare-and-set on the status the caller
//!   observed. A lost race returns [`StoreError::Conflict`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tw_core::{AgentId, AssetId, CertificateId, DeliveryId, JobId, PartnerId, UserId};
use tw_state::{
    Agent, AgentStatus, AgentSummary, Asset, BlockchainRecord, Certificate, CertificateStatus,
    Delivery, JobStatus, Partner, User, WipeJob, WipeResult,
};

use crate::error::StoreError;

/// Default page size for job listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 200;

/// Filters for [`JobStore::list_jobs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    /// Only jobs in this status.
    pub status: Option<JobStatus>,
    /// Only jobs assigned to this agent.
    pub assigned_agent_id: Option<AgentId>,
    /// Page size; clamped to [`MAX_PAGE_LIMIT`].
    pub limit: u32,
    /// Rows to skip.
    pub offset: u32,
}

impl JobFilter {
    /// First page, no filters.
    pub fn new() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            ..Self::default()
        }
    }

    /// Page size after clamping; zero falls back to the default.
    pub fn effective_limit(&self) -> u32 {
        match self.limit {
            0 => DEFAULT_PAGE_LIMIT,
            n => n.min(MAX_PAGE_LIMIT),
        }
    }

    pub(crate) fn matches(&self, job: &WipeJob) -> bool {
        self.status.map_or(true, |s| job.status == s)
            && self
                .assigned_agent_id
                .map_or(true, |a| job.assigned_agent_id == Some(a))
    }
}

/// Filters for [`JobStore::list_certificates`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateFilter {
    /// Only certificates with this verdict.
    pub status: Option<CertificateStatus>,
    /// Only the certificate bound to this job.
    pub job_id: Option<JobId>,
}

impl CertificateFilter {
    pub(crate) fn matches(&self, cert: &Certificate) -> bool {
        self.status.map_or(true, |s| cert.status == s)
            && self.job_id.map_or(true, |j| cert.job_id == Some(j))
    }
}

/// One page of a listing together with the unpaged total.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Rows on this page.
    pub items: Vec<T>,
    /// Rows matching the filter across all pages.
    pub total: u64,
    /// Effective page size.
    pub limit: u32,
    /// Rows skipped.
    pub offset: u32,
}

/// Persistence for every TrustWipe entity.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    // ── Health ──────────────────────────────────────────────────────

    /// Round-trip to the backing store.
    async fn ping(&self) -> Result<(), StoreError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Insert a user; a duplicate email is a conflict.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Fetch a user.
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    // ── Agents ──────────────────────────────────────────────────────

    /// Insert an agent; a duplicate name is a conflict.
    async fn insert_agent(&self, agent: &Agent) -> Result<(), StoreError>;

    /// Fetch an agent.
    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>, StoreError>;

    /// Every agent with its QUEUED + RUNNING job count, oldest enrollment first.
    async fn list_agents(&self) -> Result<Vec<AgentSummary>, StoreError>;

    /// Replace an agent's status.
    async fn set_agent_status(
        &self,
        id: AgentId,
        status: AgentStatus,
    ) -> Result<Agent, StoreError>;

    /// Refresh an agent's last-seen timestamp.
    async fn touch_agent(&self, id: AgentId, now: DateTime<Utc>) -> Result<(), StoreError>;

    // ── Assets ──────────────────────────────────────────────────────

    /// Fetch an asset.
    async fn get_asset(&self, id: AssetId) -> Result<Option<Asset>, StoreError>;

    // ── Jobs ────────────────────────────────────────────────────────

    /// Insert a freshly created job, together with the asset it was
    /// created for when that asset is new. Either both rows are written
    /// or neither is.
    async fn insert_job(
        &self,
        job: &WipeJob,
        new_asset: Option<&Asset>,
    ) -> Result<(), StoreError>;

    /// Fetch a job.
    async fn get_job(&self, id: JobId) -> Result<Option<WipeJob>, StoreError>;

    /// Newest-first page of jobs.
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Page<WipeJob>, StoreError>;

    /// Atomically claim the oldest unclaimed QUEUED job assigned to `agent`.
    async fn claim_next_job(
        &self,
        agent: AgentId,
        now: DateTime<Utc>,
    ) -> Result<Option<WipeJob>, StoreError>;

    /// Persist the mutable fields of `job` if its stored status is still
    /// `expected`.
    async fn update_job(&self, job: &WipeJob, expected: JobStatus) -> Result<(), StoreError>;

    // ── Results ─────────────────────────────────────────────────────

    /// Insert the single result of a job and the certificate issued for
    /// it, atomically. A second result for the job is a conflict and
    /// writes nothing.
    async fn insert_result(
        &self,
        result: &WipeResult,
        certificate: &Certificate,
    ) -> Result<(), StoreError>;

    /// The result ingested for a job, if any.
    async fn get_result_for_job(&self, job_id: JobId) -> Result<Option<WipeResult>, StoreError>;

    // ── Certificates ────────────────────────────────────────────────

    /// Insert a certificate.
    async fn insert_certificate(&self, cert: &Certificate) -> Result<(), StoreError>;

    /// Fetch a certificate.
    async fn get_certificate(&self, id: CertificateId) -> Result<Option<Certificate>, StoreError>;

    /// Certificates matching `filter`, newest first.
    async fn list_certificates(
        &self,
        filter: &CertificateFilter,
    ) -> Result<Vec<Certificate>, StoreError>;

    // ── Blockchain records ──────────────────────────────────────────

    /// Insert or replace the anchor record of a job.
    async fn upsert_anchor(&self, record: &BlockchainRecord) -> Result<(), StoreError>;

    /// Remove the anchor record of a job. Missing records are not an
    /// error.
    async fn delete_anchor(&self, job_id: JobId) -> Result<(), StoreError>;

    /// The anchor record of a job.
    async fn get_anchor(&self, job_id: JobId) -> Result<Option<BlockchainRecord>, StoreError>;

    /// The anchor record carrying `tx_hash`.
    async fn find_anchor_by_tx(
        &self,
        tx_hash: &str,
    ) -> Result<Option<BlockchainRecord>, StoreError>;

    // ── Partners and deliveries ─────────────────────────────────────

    /// Insert a partner.
    async fn insert_partner(&self, partner: &Partner) -> Result<(), StoreError>;

    /// Fetch a partner.
    async fn get_partner(&self, id: PartnerId) -> Result<Option<Partner>, StoreError>;

    /// Insert a delivery.
    async fn insert_delivery(&self, delivery: &Delivery) -> Result<(), StoreError>;

    /// Fetch a delivery.
    async fn get_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>, StoreError>;

    /// Persist status, attempts, and error of an existing delivery.
    async fn save_delivery(&self, delivery: &Delivery) -> Result<(), StoreError>;
}
