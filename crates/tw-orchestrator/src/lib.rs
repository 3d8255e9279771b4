//! # tw-orchestrator: Job Orchestrator
//!
//! Every externally triggered TrustWipe operation goes through
//! [`JobOrchestrator`]:
//!
//! | Operation | Effect |
//! |---|---|
//! | `create_job` | QUEUED job with a frozen policy snapshot |
//! | `poll` | atomic claim of the agent's oldest QUEUED job |
//! | `update_status` | state machine transition, assigned agent or admin only |
//! | `ingest_result` | result + certificate, then anchor enqueue |
//! | `upload_certificate` | standalone certificate with its verification verdict |
//! | `anchor_certificate` / `verify_anchor` / `find_anchor` | ledger anchoring |
//! | `create_delivery` | PENDING delivery, then delivery enqueue |
//!
//! Errors follow the [`OrchestratorError`] taxonomy; each variant maps to a
//! stable code and HTTP status.

pub mod certificates;
pub mod deliveries;
pub mod error;
pub mod jobs;
pub mod orchestrator;

pub use certificates::{AnchorLookup, CertificateUpload, IngestedResult, ResultUpload};
pub use error::OrchestratorError;
pub use jobs::{AssetDetails, CreateJobRequest, JobAsset, DEFAULT_MEDIA};
pub use orchestrator::JobOrchestrator;
