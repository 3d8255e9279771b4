//! Orchestrator scenarios over the in-memory store and queue: job creation
//! and policy, polling races, the status state machine, result ingestion
//! through anchoring, certificate uploads, and delivery requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tw_anchor::{AnchorService, MockLedger};
use tw_core::{DeliveryMethod, MediaType, NistCategory, TaskId, WipeMethod, WipeScope};
use tw_crypto::{Pkcs7Verifier, TrustStore};
use tw_delivery::{DeliveryService, HttpTransport, MemoryMailer};
use tw_orchestrator::{
    AssetDetails, CertificateUpload, CreateJobRequest, JobAsset, JobOrchestrator, ResultUpload,
};
use tw_policy::PolicyRequest;
use tw_queue::{
    FailureOutcome, MemoryQueue, QueueError, QueueName, TaskEnvelope, TaskQueue, TaskStatus,
    WorkerConfig, WorkerPool,
};
use tw_state::{
    Actor, AgentStatus, AnchorStatus, CertificateArtifacts, CertificateStatus, DeliveryStatus,
    JobStatus, NewAgent, NewPartner, ResultArtifacts, Role, StatusUpdate, User,
};
use tw_store::{AuditEventKind, JobFilter, JobStore, MemoryAuditSink, MemoryStore};

const CA: &[u8] = include_bytes!("../../tw-crypto/tests/fixtures/ca.pem");
const DOCUMENT: &[u8] = include_bytes!("../../tw-crypto/tests/fixtures/document.json");
const SIG_VALID: &[u8] = include_bytes!("../../tw-crypto/tests/fixtures/document.signer.p7s");
const SIG_EXPIRED: &[u8] =
    include_bytes!("../../tw-crypto/tests/fixtures/document.expired_signer.p7s");

/// Memory queue whose `enqueue` can be switched off to stand in for an
/// unreachable queue database.
struct GatedQueue {
    inner: MemoryQueue,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl TaskQueue for GatedQueue {
    async fn ping(&self) -> Result<(), QueueError> {
        self.inner.ping().await
    }

    async fn enqueue(&self, task: &TaskEnvelope) -> Result<(), QueueError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(QueueError::Corrupt {
                id: task.id.to_string(),
                reason: "queue unavailable".into(),
            });
        }
        self.inner.enqueue(task).await
    }

    async fn claim(
        &self,
        queue: QueueName,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<TaskEnvelope>, QueueError> {
        self.inner.claim(queue, now, lease).await
    }

    async fn complete(&self, task: &TaskEnvelope, now: DateTime<Utc>) -> Result<(), QueueError> {
        self.inner.complete(task, now).await
    }

    async fn fail(
        &self,
        task: &TaskEnvelope,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(TaskEnvelope, FailureOutcome), QueueError> {
        self.inner.fail(task, error, now).await
    }

    async fn reap_abandoned(
        &self,
        queue: QueueName,
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskEnvelope>, QueueError> {
        self.inner.reap_abandoned(queue, now).await
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskEnvelope>, QueueError> {
        self.inner.get(id).await
    }
}

struct Harness {
    store: MemoryStore,
    queue: MemoryQueue,
    enqueue_open: Arc<AtomicBool>,
    audit: MemoryAuditSink,
    ledger: MockLedger,
    anchor_pool: WorkerPool,
    orchestrator: JobOrchestrator,
    admin: Actor,
    operator: Actor,
}

fn harness() -> Harness {
    let store = MemoryStore::new();
    let queue = MemoryQueue::new();
    let audit = MemoryAuditSink::new();
    let ledger = MockLedger::new();
    let enqueue_open = Arc::new(AtomicBool::new(true));
    let gated: Arc<dyn TaskQueue> = Arc::new(GatedQueue {
        inner: queue.clone(),
        open: enqueue_open.clone(),
    });

    let anchors = AnchorService::new(
        Arc::new(store.clone()),
        gated.clone(),
        Arc::new(ledger.clone()),
        Arc::new(audit.clone()),
    );
    let deliveries = DeliveryService::new(
        Arc::new(store.clone()),
        gated,
        HttpTransport::new(Duration::from_secs(5)).unwrap(),
        Arc::new(MemoryMailer::new()),
        Arc::new(audit.clone()),
    );
    let anchor_handler = Arc::new(anchors.clone());
    let anchor_pool = WorkerPool::new(
        QueueName::Anchor,
        Arc::new(queue.clone()),
        anchor_handler.clone(),
        WorkerConfig::anchor(),
    )
    .with_observer(anchor_handler);

    let verifier = Pkcs7Verifier::new(Arc::new(TrustStore::from_pem(CA).unwrap()));
    let orchestrator = JobOrchestrator::new(
        Arc::new(store.clone()),
        Arc::new(verifier),
        anchors,
        deliveries,
        Arc::new(audit.clone()),
    );

    Harness {
        store,
        queue,
        enqueue_open,
        audit,
        ledger,
        anchor_pool,
        orchestrator,
        admin: User::new("admin@example.com", Role::Admin, Utc::now()).as_actor(),
        operator: User::new("ops@example.com", Role::Operator, Utc::now()).as_actor(),
    }
}

fn new_agent(name: &str) -> NewAgent {
    NewAgent {
        name: name.into(),
        os: "linux".into(),
        version: "1.4.2".into(),
        public_key: None,
        mtls_cert: None,
    }
}

fn drive_job(
    media: MediaType,
    category: NistCategory,
    agent: Option<tw_core::AgentId>,
) -> CreateJobRequest {
    CreateJobRequest {
        asset: JobAsset::Register(AssetDetails {
            media_type: media,
            model: Some("Model X".into()),
            serial_number: Some("SN-0001".into()),
            capacity_bytes: Some(512_000_000_000),
        }),
        scope: WipeScope::Drive,
        target: "/dev/nvme0n1".into(),
        policy: PolicyRequest::for_category(category),
        assigned_agent_id: agent,
        confirm: true,
    }
}

/// Enroll an agent and create a job assigned to it.
async fn assigned_job(h: &Harness) -> (Actor, tw_state::WipeJob) {
    let agent = h.orchestrator.enroll_agent(new_agent("bay-1")).await.unwrap();
    let job = h
        .orchestrator
        .create_job(
            &h.operator,
            drive_job(MediaType::Ssd, NistCategory::Purge, Some(agent.id)),
        )
        .await
        .unwrap();
    (Actor::Agent { id: agent.id }, job)
}

async fn run_job_to(h: &Harness, agent: &Actor, job: &tw_state::WipeJob, end: JobStatus) {
    h.orchestrator
        .update_status(agent, job.id, StatusUpdate::to(JobStatus::Running))
        .await
        .unwrap();
    h.orchestrator
        .update_status(agent, job.id, StatusUpdate::to(end))
        .await
        .unwrap();
}

/// A failed job whose unsigned result has been ingested.
async fn certified_job(h: &Harness) -> (Actor, tw_state::WipeJob) {
    let (agent, job) = assigned_job(h).await;
    run_job_to(h, &agent, &job, JobStatus::Failed).await;
    h.orchestrator
        .ingest_result(&agent, job.id, unsigned_upload())
        .await
        .unwrap();
    (agent, job)
}

fn unsigned_upload() -> ResultUpload {
    ResultUpload {
        document: br#"{"deviceInfo":{"serial":"SN-0001"},"metrics":{},"proof":{}}"#.to_vec(),
        ..ResultUpload::default()
    }
}

// ─── Job creation ────────────────────────────────────────────────────

#[tokio::test]
async fn ssd_purge_job_resolves_to_nvme_sanitize() {
    let h = harness();
    let job = h
        .orchestrator
        .create_job(&h.operator, drive_job(MediaType::Ssd, NistCategory::Purge, None))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.method, WipeMethod::NvmeSanitize);
    assert_eq!(job.policy_snapshot.verify_sample_percent, 0);
    assert_eq!(job.policy_snapshot.media_type, MediaType::Ssd);
    let asset = h.store.get_asset(job.asset_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(asset.media_type, MediaType::Ssd);
    assert_eq!(h.orchestrator.get_job(job.id).await.unwrap(), job);
    assert_eq!(h.audit.kinds(), vec![AuditEventKind::WipeJobCreated]);
}

#[tokio::test]
async fn job_without_asset_is_resolved_for_hdd() {
    let h = harness();
    let request = CreateJobRequest {
        asset: JobAsset::Unspecified,
        ..drive_job(MediaType::Ssd, NistCategory::Purge, None)
    };
    let job = h.orchestrator.create_job(&h.admin, request).await.unwrap();
    assert_eq!(job.asset_id, None);
    assert_eq!(job.method, WipeMethod::AtaSecureErase);
}

#[tokio::test]
async fn unconfirmed_job_is_rejected_before_any_write() {
    let h = harness();
    let request = CreateJobRequest {
        confirm: false,
        ..drive_job(MediaType::Hdd, NistCategory::Clear, None)
    };
    let err = h.orchestrator.create_job(&h.operator, request).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION_FAILED");
    assert_eq!(h.orchestrator.list_jobs(&JobFilter::new()).await.unwrap().total, 0);
    assert!(h.audit.kinds().is_empty());
}

#[tokio::test]
async fn crypto_erase_override_on_hdd_is_rejected() {
    let h = harness();
    let mut request = drive_job(MediaType::Hdd, NistCategory::Clear, None);
    request.policy.method = Some(WipeMethod::CryptoErase);
    let err = h.orchestrator.create_job(&h.operator, request).await.unwrap_err();
    assert_eq!(err.http_status(), 422);
    assert!(err.to_string().contains("CRYPTO_ERASE"), "{err}");
}

#[tokio::test]
async fn agents_and_liaisons_cannot_create_jobs() {
    let h = harness();
    let liaison = User::new("p@example.com", Role::PartnerLiaison, Utc::now()).as_actor();
    for actor in [liaison, Actor::Agent { id: tw_core::AgentId::new() }] {
        let err = h
            .orchestrator
            .create_job(&actor, drive_job(MediaType::Hdd, NistCategory::Clear, None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }
}

#[tokio::test]
async fn job_for_unknown_agent_is_not_found() {
    let h = harness();
    let err = h
        .orchestrator
        .create_job(
            &h.operator,
            drive_job(MediaType::Hdd, NistCategory::Clear, Some(tw_core::AgentId::new())),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

// ─── Agents and polling ──────────────────────────────────────────────

#[tokio::test]
async fn duplicate_agent_name_conflicts() {
    let h = harness();
    h.orchestrator.enroll_agent(new_agent("bay-1")).await.unwrap();
    let err = h.orchestrator.enroll_agent(new_agent("bay-1")).await.unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
    assert_eq!(h.orchestrator.list_agents().await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_polls_hand_out_the_job_once() {
    let h = harness();
    let (agent, job) = assigned_job(&h).await;
    let agent_id = agent.agent_id().unwrap();

    let (a, b) = tokio::join!(
        h.orchestrator.poll(agent_id, JobStatus::Queued),
        h.orchestrator.poll(agent_id, JobStatus::Queued),
    );
    let winners: Vec<_> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].id, job.id);
    assert!(winners[0].claimed_at.is_some());
}

#[tokio::test]
async fn poll_refreshes_last_seen_even_without_work() {
    let h = harness();
    let agent = h.orchestrator.enroll_agent(new_agent("idle")).await.unwrap();
    assert!(agent.last_seen.is_none());

    assert!(h.orchestrator.poll(agent.id, JobStatus::Queued).await.unwrap().is_none());
    let seen = h.store.get_agent(agent.id).await.unwrap().unwrap();
    assert!(seen.last_seen.is_some());
}

#[tokio::test]
async fn poll_accepts_only_the_queued_filter() {
    let h = harness();
    let agent = h.orchestrator.enroll_agent(new_agent("bay-2")).await.unwrap();
    let err = h
        .orchestrator
        .poll(agent.id, JobStatus::Running)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_FAILED");
}

#[tokio::test]
async fn agent_status_changes_are_admin_only() {
    let h = harness();
    let agent = h.orchestrator.enroll_agent(new_agent("bay-3")).await.unwrap();
    let err = h
        .orchestrator
        .set_agent_status(&h.operator, agent.id, AgentStatus::Maintenance)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    let updated = h
        .orchestrator
        .set_agent_status(&h.admin, agent.id, AgentStatus::Maintenance)
        .await
        .unwrap();
    assert_eq!(updated.status, AgentStatus::Maintenance);
    assert_eq!(
        h.audit.kinds(),
        vec![AuditEventKind::AgentEnrolled, AuditEventKind::AgentStatusChanged]
    );
}

// ─── Status updates ──────────────────────────────────────────────────

#[tokio::test]
async fn lifecycle_sets_timestamps_and_freezes_terminal_state() {
    let h = harness();
    let (agent, job) = assigned_job(&h).await;

    let running = h
        .orchestrator
        .update_status(&agent, job.id, StatusUpdate::to(JobStatus::Running))
        .await
        .unwrap();
    let started = running.started_at.unwrap();

    let progressed = h
        .orchestrator
        .update_status(
            &agent,
            job.id,
            StatusUpdate {
                progress: Some(60),
                ..StatusUpdate::to(JobStatus::Running)
            },
        )
        .await
        .unwrap();
    assert_eq!(progressed.started_at, Some(started));
    assert_eq!(progressed.progress, Some(60));

    let done = h
        .orchestrator
        .update_status(&agent, job.id, StatusUpdate::to(JobStatus::Succeeded))
        .await
        .unwrap();
    assert!(done.finished_at.is_some());

    for to in JobStatus::ALL {
        let err = h
            .orchestrator
            .update_status(&h.admin, job.id, StatusUpdate::to(to))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }
    assert_eq!(
        h.orchestrator.get_job(job.id).await.unwrap().status,
        JobStatus::Succeeded
    );

    let kinds = h.audit.kinds();
    assert_eq!(
        kinds.iter().filter(|k| **k == AuditEventKind::WipeJobStarted).count(),
        1
    );
    assert!(kinds.contains(&AuditEventKind::WipeJobCompleted));
}

#[tokio::test]
async fn unassigned_agent_update_is_forbidden_and_ignored() {
    let h = harness();
    let (_, job) = assigned_job(&h).await;
    let stranger = Actor::Agent {
        id: tw_core::AgentId::new(),
    };
    let err = h
        .orchestrator
        .update_status(&stranger, job.id, StatusUpdate::to(JobStatus::Cancelled))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
    assert_eq!(
        h.orchestrator.get_job(job.id).await.unwrap().status,
        JobStatus::Queued
    );
}

#[tokio::test]
async fn admin_may_cancel_and_progress_is_validated() {
    let h = harness();
    let (agent, job) = assigned_job(&h).await;
    let err = h
        .orchestrator
        .update_status(
            &agent,
            job.id,
            StatusUpdate {
                progress: Some(150),
                ..StatusUpdate::to(JobStatus::Running)
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_FAILED");

    let cancelled = h
        .orchestrator
        .update_status(&h.admin, job.id, StatusUpdate::to(JobStatus::Cancelled))
        .await
        .unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(h.audit.kinds().contains(&AuditEventKind::WipeJobCancelled));
}

#[tokio::test]
async fn missing_job_is_not_found() {
    let h = harness();
    let err = h
        .orchestrator
        .update_status(&h.admin, tw_core::JobId::new(), StatusUpdate::to(JobStatus::Running))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404);
}

// ─── Results, certificates, anchors ──────────────────────────────────

#[tokio::test]
async fn signed_result_is_certified_and_anchored() {
    let h = harness();
    let (agent, job) = assigned_job(&h).await;
    run_job_to(&h, &agent, &job, JobStatus::Succeeded).await;

    let ingested = h
        .orchestrator
        .ingest_result(
            &agent,
            job.id,
            ResultUpload {
                document: DOCUMENT.to_vec(),
                signature: Some(SIG_VALID.to_vec()),
                artifacts: ResultArtifacts {
                    pdf_ref: Some("uploads/cert.pdf".into()),
                    json_ref: None,
                },
                signature_ref: Some("uploads/cert.p7s".into()),
            },
        )
        .await
        .unwrap();

    let cert = &ingested.certificate;
    assert_eq!(cert.job_id, Some(job.id));
    assert_eq!(cert.nist_category, Some(NistCategory::Purge));
    assert_eq!(cert.status, CertificateStatus::Verified, "{:?}", cert.verification_errors);
    assert!(cert.chain_checked);
    assert_eq!(cert.artifacts.pkcs7_ref.as_deref(), Some("uploads/cert.p7s"));
    assert_eq!(ingested.anchor.status, AnchorStatus::Pending);
    assert_eq!(ingested.anchor.cert_hash, cert.hash);

    assert_eq!(h.anchor_pool.drain_once(Utc::now()).await.unwrap().completed, 1);
    let anchored = h.orchestrator.get_anchor(job.id).await.unwrap();
    assert_eq!(anchored.status, AnchorStatus::Confirmed);
    let tx = anchored.tx_hash.clone().unwrap();

    let lookup = h.orchestrator.find_anchor(&tx).await.unwrap();
    assert!(lookup.verified);
    assert_eq!(lookup.record, anchored);
    assert_eq!(h.ledger.submissions().len(), 1);

    let kinds = h.audit.kinds();
    for kind in [
        AuditEventKind::WipeResultIngested,
        AuditEventKind::CertificateGenerated,
        AuditEventKind::BlockchainAnchorCreated,
        AuditEventKind::BlockchainAnchorConfirmed,
    ] {
        assert!(kinds.contains(&kind), "missing {kind}");
    }
    assert!(h.audit.verify_chain().chain_valid);
}

#[tokio::test]
async fn second_result_for_a_job_conflicts() {
    let h = harness();
    let (agent, job) = assigned_job(&h).await;
    run_job_to(&h, &agent, &job, JobStatus::Failed).await;

    let upload = unsigned_upload();
    let first = h
        .orchestrator
        .ingest_result(&agent, job.id, upload.clone())
        .await
        .unwrap();
    assert_eq!(first.certificate.status, CertificateStatus::Pending);

    let err = h
        .orchestrator
        .ingest_result(&agent, job.id, upload)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
    assert_eq!(h.queue.count(QueueName::Anchor, TaskStatus::Pending), 1);
}

#[tokio::test]
async fn ingestion_cut_short_before_anchoring_resumes_on_retry() {
    let h = harness();
    let (agent, job) = assigned_job(&h).await;
    run_job_to(&h, &agent, &job, JobStatus::Succeeded).await;
    let upload = ResultUpload {
        document: DOCUMENT.to_vec(),
        signature: Some(SIG_VALID.to_vec()),
        ..ResultUpload::default()
    };

    h.enqueue_open.store(false, Ordering::SeqCst);
    let err = h
        .orchestrator
        .ingest_result(&agent, job.id, upload.clone())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TRANSIENT_IO");

    let stored = h.store.get_result_for_job(job.id).await.unwrap().unwrap();
    let certificates = h
        .orchestrator
        .list_certificates(&tw_store::CertificateFilter {
            job_id: Some(job.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(certificates.len(), 1);
    assert!(h.store.get_anchor(job.id).await.unwrap().is_none());
    assert_eq!(h.queue.count(QueueName::Anchor, TaskStatus::Pending), 0);

    h.enqueue_open.store(true, Ordering::SeqCst);
    let resumed = h
        .orchestrator
        .ingest_result(&agent, job.id, upload.clone())
        .await
        .unwrap();
    assert_eq!(resumed.result.id, stored.id);
    assert_eq!(resumed.certificate, certificates[0]);
    assert_eq!(resumed.anchor.status, AnchorStatus::Pending);
    assert_eq!(resumed.anchor.cert_hash, resumed.certificate.hash);
    assert_eq!(h.queue.count(QueueName::Anchor, TaskStatus::Pending), 1);

    assert_eq!(h.anchor_pool.drain_once(Utc::now()).await.unwrap().completed, 1);
    let anchored = h.orchestrator.get_anchor(job.id).await.unwrap();
    assert_eq!(anchored.status, AnchorStatus::Confirmed);

    let err = h
        .orchestrator
        .ingest_result(&agent, job.id, upload)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
}

#[tokio::test]
async fn result_for_queued_job_is_refused() {
    let h = harness();
    let (agent, job) = assigned_job(&h).await;
    let err = h
        .orchestrator
        .ingest_result(
            &agent,
            job.id,
            ResultUpload {
                document: b"{}".to_vec(),
                ..ResultUpload::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
    assert!(h.store.get_result_for_job(job.id).await.unwrap().is_none());
}

#[tokio::test]
async fn malformed_result_document_is_a_validation_failure() {
    let h = harness();
    let (agent, job) = assigned_job(&h).await;
    h.orchestrator
        .update_status(&agent, job.id, StatusUpdate::to(JobStatus::Running))
        .await
        .unwrap();
    let err = h
        .orchestrator
        .ingest_result(
            &agent,
            job.id,
            ResultUpload {
                document: b"{not json".to_vec(),
                ..ResultUpload::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_FAILED");
    assert!(h.store.get_result_for_job(job.id).await.unwrap().is_none());
}

#[tokio::test]
async fn uploaded_certificate_verdicts() {
    let h = harness();

    let unsigned = h
        .orchestrator
        .upload_certificate(
            &h.operator,
            CertificateUpload {
                nist_category: NistCategory::Clear,
                document: DOCUMENT.to_vec(),
                signature: None,
                artifacts: CertificateArtifacts::default(),
            },
        )
        .await
        .unwrap();
    assert_eq!(unsigned.status, CertificateStatus::Pending);

    let expired = h
        .orchestrator
        .upload_certificate(
            &h.operator,
            CertificateUpload {
                nist_category: NistCategory::Clear,
                document: DOCUMENT.to_vec(),
                signature: Some(SIG_EXPIRED.to_vec()),
                artifacts: CertificateArtifacts::default(),
            },
        )
        .await
        .unwrap();
    assert_eq!(expired.status, CertificateStatus::Invalid);
    assert!(expired
        .verification_errors
        .iter()
        .any(|e| e.contains("expired")));
    assert_eq!(expired.hash, unsigned.hash);

    let stored = h.orchestrator.get_certificate(expired.id).await.unwrap();
    assert_eq!(stored, expired);

    let err = h.orchestrator.anchor_certificate(expired.id).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION_FAILED");
    assert_eq!(h.queue.count(QueueName::Anchor, TaskStatus::Pending), 0);
}

#[tokio::test]
async fn unknown_transaction_lookup_is_not_found() {
    let h = harness();
    let err = h.orchestrator.find_anchor("0xdeadbeef").await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    assert!(!h.orchestrator.verify_anchor("0xdeadbeef").await.unwrap());
}

// ─── Deliveries ──────────────────────────────────────────────────────

#[tokio::test]
async fn delivery_requires_a_configured_method() {
    let h = harness();
    let (_, job) = certified_job(&h).await;
    let partner = h
        .orchestrator
        .register_partner(
            &h.operator,
            NewPartner {
                name: "GreenCycle".into(),
                webhook_url: Some("https://hooks.example.com/wipe".into()),
                ..NewPartner::default()
            },
        )
        .await
        .unwrap();

    let err = h
        .orchestrator
        .create_delivery(&h.operator, job.id, partner.id, DeliveryMethod::Email)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_FAILED");
    assert_eq!(h.queue.count(QueueName::Delivery, TaskStatus::Pending), 0);

    let delivery = h
        .orchestrator
        .create_delivery(&h.operator, job.id, partner.id, DeliveryMethod::Webhook)
        .await
        .unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Pending);
    assert_eq!(delivery.attempts, 0);
    assert_eq!(h.orchestrator.get_delivery(delivery.id).await.unwrap(), delivery);
    assert_eq!(h.queue.count(QueueName::Delivery, TaskStatus::Pending), 1);
    assert!(h.audit.kinds().contains(&AuditEventKind::DeliveryCreated));
}

#[tokio::test]
async fn delivery_for_uncertified_job_is_rejected() {
    let h = harness();
    let (_, job) = assigned_job(&h).await;
    let partner = h
        .orchestrator
        .register_partner(
            &h.operator,
            NewPartner {
                name: "GreenCycle".into(),
                webhook_url: Some("https://hooks.example.com/wipe".into()),
                ..NewPartner::default()
            },
        )
        .await
        .unwrap();

    let err = h
        .orchestrator
        .create_delivery(&h.operator, job.id, partner.id, DeliveryMethod::Webhook)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_FAILED");
    assert!(err.to_string().contains("no certificate"), "{err}");
    assert_eq!(h.queue.count(QueueName::Delivery, TaskStatus::Pending), 0);
    assert!(!h.audit.kinds().contains(&AuditEventKind::DeliveryCreated));
}

#[tokio::test]
async fn agents_cannot_request_deliveries() {
    let h = harness();
    let (agent, job) = assigned_job(&h).await;
    let err = h
        .orchestrator
        .create_delivery(&agent, job.id, tw_core::PartnerId::new(), DeliveryMethod::Api)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
}

#[tokio::test]
async fn half_configured_api_partner_is_rejected() {
    let h = harness();
    let err = h
        .orchestrator
        .register_partner(
            &h.admin,
            NewPartner {
                name: "ReCircuit".into(),
                api_base: Some("https://api.example.com".into()),
                ..NewPartner::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_FAILED");
}

#[tokio::test]
async fn partner_endpoints_must_be_http_urls() {
    let h = harness();
    for webhook in ["not a url", "ftp://files.example.com/drop"] {
        let err = h
            .orchestrator
            .register_partner(
                &h.admin,
                NewPartner {
                    name: "GreenCycle".into(),
                    webhook_url: Some(webhook.into()),
                    ..NewPartner::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED", "{webhook}");
    }
}

// ─── Users ───────────────────────────────────────────────────────────

#[tokio::test]
async fn only_admins_register_users() {
    let h = harness();
    let err = h
        .orchestrator
        .register_user(&h.operator, "new@example.com", Role::Operator)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    let user = h
        .orchestrator
        .register_user(&h.admin, "New@Example.com", Role::Operator)
        .await
        .unwrap();
    assert_eq!(user.email, "new@example.com");
    let dup = h
        .orchestrator
        .register_user(&h.admin, "new@example.com", Role::Admin)
        .await
        .unwrap_err();
    assert_eq!(dup.code(), "CONFLICT");
}
