//! Ingested wipe results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tw_core::{JobId, ResultId};

/// The JSON document an agent uploads when a job finishes.
///
/// Free-form below the top level: agents report whatever device details
/// and metrics their platform exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDocument {
    /// Device identification (model, serial, firmware, ...).
    #[serde(default)]
    pub device_info: Value,
    /// Execution metrics (duration, throughput, sectors verified, ...).
    #[serde(default)]
    pub metrics: Value,
    /// Machine-generated proof of sanitization.
    #[serde(default)]
    pub proof: Value,
}

/// References to artifact files stored outside the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultArtifacts {
    /// Rendered PDF certificate.
    pub pdf_ref: Option<String>,
    /// Machine-readable JSON certificate.
    pub json_ref: Option<String>,
}

/// The result of a finished job. At most one per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WipeResult {
    /// Unique identifier.
    pub id: ResultId,
    /// Owning job.
    pub job_id: JobId,
    /// Device identification.
    pub device_info: Value,
    /// Execution metrics.
    pub metrics: Value,
    /// Proof blob.
    pub proof: Value,
    /// Artifact file references.
    pub artifacts: ResultArtifacts,
    /// Ingestion time.
    pub created_at: DateTime<Utc>,
}

impl WipeResult {
    /// Build the result row for `job_id`.
    pub fn new(
        job_id: JobId,
        document: ResultDocument,
        artifacts: ResultArtifacts,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ResultId::new(),
            job_id,
            device_info: document.device_info,
            metrics: document.metrics,
            proof: document.proof,
            artifacts,
            created_at: now,
        }
    }
}
