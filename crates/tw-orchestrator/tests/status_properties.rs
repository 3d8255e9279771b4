//! Property tests: arbitrary update sequences against a persisted job.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use proptest::prelude::*;
use tw_anchor::{AnchorService, MockLedger};
use tw_core::{NistCategory, WipeScope};
use tw_crypto::{Pkcs7Verifier, TrustStore};
use tw_delivery::{DeliveryService, DisabledMailer, HttpTransport};
use tw_orchestrator::{CreateJobRequest, JobAsset, JobOrchestrator};
use tw_policy::PolicyRequest;
use tw_queue::MemoryQueue;
use tw_state::{JobStatus, Role, StatusUpdate, User};
use tw_store::{MemoryStore, TracingAuditSink};

fn orchestrator() -> JobOrchestrator {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let audit = Arc::new(TracingAuditSink);
    let anchors = AnchorService::new(
        store.clone(),
        queue.clone(),
        Arc::new(MockLedger::new()),
        audit.clone(),
    );
    let deliveries = DeliveryService::new(
        store.clone(),
        queue,
        HttpTransport::new(Duration::from_secs(1)).unwrap(),
        Arc::new(DisabledMailer),
        audit.clone(),
    );
    JobOrchestrator::new(
        store,
        Arc::new(Pkcs7Verifier::new(Arc::new(TrustStore::empty()))),
        anchors,
        deliveries,
        audit,
    )
}

fn status() -> impl Strategy<Value = JobStatus> {
    prop::sample::select(JobStatus::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn terminal_jobs_never_change(updates in prop::collection::vec(status(), 1..12)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async move {
            let orch = orchestrator();
            let admin = User::new("admin@example.com", Role::Admin, Utc::now()).as_actor();
            let job = orch
                .create_job(
                    &admin,
                    CreateJobRequest {
                        asset: JobAsset::Unspecified,
                        scope: WipeScope::Drive,
                        target: "/dev/sdb".into(),
                        policy: PolicyRequest::for_category(NistCategory::Clear),
                        assigned_agent_id: None,
                        confirm: true,
                    },
                )
                .await
                .unwrap();

            let mut terminal: Option<JobStatus> = None;
            for to in updates {
                let before = orch.get_job(job.id).await.unwrap().status;
                let result = orch.update_status(&admin, job.id, StatusUpdate::to(to)).await;
                let after = orch.get_job(job.id).await.unwrap().status;

                if let Some(frozen) = terminal {
                    prop_assert_eq!(result.unwrap_err().code(), "CONFLICT");
                    prop_assert_eq!(after, frozen);
                    continue;
                }
                match result {
                    Ok(updated) => {
                        prop_assert!(before.can_transition_to(to));
                        prop_assert_eq!(updated.status, to);
                        prop_assert_eq!(after, to);
                    }
                    Err(e) => {
                        prop_assert!(!before.can_transition_to(to));
                        prop_assert_eq!(e.code(), "CONFLICT");
                        prop_assert_eq!(after, before);
                    }
                }
                if after.is_terminal() {
                    terminal = Some(after);
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
