//! Service graph built from configuration alone, in in-memory mode.

use std::collections::HashMap;

use chrono::Utc;
use tw_cli::serve::{build_services, trust_store};
use tw_cli::Config;
use tw_core::{NistCategory, WipeScope};
use tw_orchestrator::{CreateJobRequest, JobAsset, ResultUpload};
use tw_policy::PolicyRequest;
use tw_state::{Actor, AnchorStatus, CertificateStatus, JobStatus, NewAgent, StatusUpdate};

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../tw-crypto/tests/fixtures");

fn config(vars: &[(&str, &str)]) -> Config {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|name| map.get(name).cloned()).unwrap()
}

#[test]
fn strict_trust_refuses_missing_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("ca-bundle.pem");
    let missing = missing.to_str().unwrap();

    let strict = config(&[("CA_BUNDLE_PATH", missing), ("REQUIRE_CA_BUNDLE", "true")]);
    assert!(trust_store(&strict).is_err());

    let degraded = config(&[("CA_BUNDLE_PATH", missing)]);
    assert!(!trust_store(&degraded).unwrap().is_loaded());
}

#[test]
fn bundle_is_loaded_when_present() {
    let ca = format!("{FIXTURES}/ca.pem");
    let strict = config(&[("CA_BUNDLE_PATH", &ca), ("REQUIRE_CA_BUNDLE", "true")]);
    assert_eq!(trust_store(&strict).unwrap().len(), 1);
}

#[tokio::test]
async fn in_memory_services_anchor_an_ingested_result() {
    let ca = format!("{FIXTURES}/ca.pem");
    let services = build_services(&config(&[("CA_BUNDLE_PATH", &ca)]))
        .await
        .unwrap();
    assert!(services.store.ping().await.is_ok());
    assert!(services.queue.ping().await.is_ok());
    assert!(services.orchestrator.verifier().trust_store().is_loaded());

    let orch = &services.orchestrator;
    let agent = orch
        .enroll_agent(NewAgent {
            name: "bay-7".into(),
            os: "linux".into(),
            version: "1.4.2".into(),
            public_key: None,
            mtls_cert: None,
        })
        .await
        .unwrap();
    let admin = tw_state::User::new("admin@example.com", tw_state::Role::Admin, Utc::now())
        .as_actor();
    let job = orch
        .create_job(
            &admin,
            CreateJobRequest {
                asset: JobAsset::Unspecified,
                scope: WipeScope::Drive,
                target: "/dev/sda".into(),
                policy: PolicyRequest::for_category(NistCategory::Clear),
                assigned_agent_id: Some(agent.id),
                confirm: true,
            },
        )
        .await
        .unwrap();

    let agent = Actor::Agent { id: agent.id };
    orch.update_status(&agent, job.id, StatusUpdate::to(JobStatus::Running))
        .await
        .unwrap();
    orch.update_status(&agent, job.id, StatusUpdate::to(JobStatus::Succeeded))
        .await
        .unwrap();

    let ingested = orch
        .ingest_result(
            &agent,
            job.id,
            ResultUpload {
                document: std::fs::read(format!("{FIXTURES}/document.json")).unwrap(),
                signature: Some(
                    std::fs::read(format!("{FIXTURES}/document.expired_signer.p7s")).unwrap(),
                ),
                ..ResultUpload::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ingested.certificate.status, CertificateStatus::Invalid);
    assert_eq!(ingested.anchor.status, AnchorStatus::Pending);

    let report = services.anchor_pool.drain_once(Utc::now()).await.unwrap();
    assert_eq!(report.completed, 1);
    let anchored = orch.get_anchor(job.id).await.unwrap();
    assert_eq!(anchored.status, AnchorStatus::Confirmed);
    assert!(orch.verify_anchor(anchored.tx_hash.as_deref().unwrap()).await.unwrap());

    let idle = services.delivery_pool.drain_once(Utc::now()).await.unwrap();
    assert_eq!(idle.claimed, 0);
}
