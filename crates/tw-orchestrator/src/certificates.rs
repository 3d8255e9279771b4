//! # Results, Certificates, and Anchors
//!
//! Result ingestion is the hinge between the agent and the back office:
//! one accepted result per job produces one certificate, and the
//! certificate's content hash is queued for ledger anchoring.
//!
//! A detached signature, when supplied, is verified against the raw
//! document bytes exactly as uploaded. The verdict is stored on the
//! certificate; an invalid signature never rejects the upload.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tw_core::{CertificateId, JobId, NistCategory};
use tw_anchor::AnchorError;
use tw_crypto::VerificationOutcome;
use tw_state::{
    Actor, AnchorStatus, BlockchainRecord, Certificate, CertificateArtifacts, JobStatus, ResultArtifacts,
    ResultDocument, WipeResult,
};
use tw_store::{AuditEvent, AuditEventKind, CertificateFilter};

use crate::error::OrchestratorError;
use crate::jobs::authorize_job_actor;
use crate::orchestrator::JobOrchestrator;

/// Input of [`JobOrchestrator::ingest_result`].
#[derive(Debug, Clone, Default)]
pub struct ResultUpload {
    /// Raw JSON result document (`deviceInfo`, `metrics`, `proof`).
    pub document: Vec<u8>,
    /// Optional detached PKCS#7 signature over `document`.
    pub signature: Option<Vec<u8>>,
    /// Stored artifact references.
    pub artifacts: ResultArtifacts,
    /// Where the detached signature was stored, if it was.
    pub signature_ref: Option<String>,
}

/// Output of [`JobOrchestrator::ingest_result`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestedResult {
    pub result: WipeResult,
    pub certificate: Certificate,
    pub anchor: BlockchainRecord,
}

/// Input of [`JobOrchestrator::upload_certificate`].
#[derive(Debug, Clone)]
pub struct CertificateUpload {
    pub nist_category: NistCategory,
    /// Raw JSON certificate document.
    pub document: Vec<u8>,
    /// Optional detached PKCS#7 signature over `document`.
    pub signature: Option<Vec<u8>>,
    pub artifacts: CertificateArtifacts,
}

/// An anchor record with the ledger's live verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorLookup {
    pub record: BlockchainRecord,
    /// Whether the transaction is mined with a successful receipt.
    pub verified: bool,
}

impl JobOrchestrator {
    // ── Results ─────────────────────────────────────────────────────

    /// Accept the single result of a job, issue its certificate, and
    /// queue the certificate hash for anchoring.
    ///
    /// The result and its certificate are stored together. A repeated
    /// upload is a conflict unless the earlier one stopped before its
    /// anchor was queued; then the stored certificate is queued and the
    /// stored ingestion is returned.
    pub async fn ingest_result(
        &self,
        actor: &Actor,
        job_id: JobId,
        upload: ResultUpload,
    ) -> Result<IngestedResult, OrchestratorError> {
        let job = self.load_job(job_id).await?;
        authorize_job_actor(actor, &job)?;
        if !matches!(
            job.status,
            JobStatus::Running | JobStatus::Succeeded | JobStatus::Failed
        ) {
            return Err(OrchestratorError::conflict(format!(
                "job {job_id} is {} and cannot accept a result",
                job.status
            )));
        }
        if let Some(stored) = self.store.get_result_for_job(job_id).await? {
            return self.resume_ingestion(job_id, stored).await;
        }

        let payload = parse_document(&upload.document)?;
        let document: ResultDocument = serde_json::from_value(payload.clone())
            .map_err(|e| OrchestratorError::validation(format!("invalid result document: {e}")))?;
        let outcome = self.verify_signature(&upload.document, upload.signature.as_deref());

        let now = Utc::now();
        let certificate = Certificate::issue(
            Some(job_id),
            Some(job.nist_category),
            payload,
            outcome.as_ref(),
            CertificateArtifacts {
                pdf_ref: upload.artifacts.pdf_ref.clone(),
                json_ref: upload.artifacts.json_ref.clone(),
                pkcs7_ref: upload.signature_ref,
            },
            now,
        )
        .map_err(|e| OrchestratorError::validation(e.to_string()))?;
        let result = WipeResult::new(job_id, document, upload.artifacts, now);

        self.store.insert_result(&result, &certificate).await?;
        tracing::info!(
            job_id = %job_id,
            certificate_id = %certificate.id,
            cert_hash = %certificate.hash,
            status = %certificate.status,
            "wipe result ingested"
        );

        self.audit(
            AuditEvent::new(AuditEventKind::WipeResultIngested, "wipe_result", result.id, now)
                .by(actor.label())
                .with_metadata(serde_json::json!({ "jobId": job_id.to_string() })),
        )
        .await;
        self.audit(certificate_event(
            AuditEventKind::CertificateGenerated,
            &certificate,
            actor,
            now,
        ))
        .await;

        let anchor = self
            .anchors
            .enqueue_anchor(job_id, &certificate.hash, now)
            .await?;

        Ok(IngestedResult {
            result,
            certificate,
            anchor,
        })
    }

    async fn resume_ingestion(
        &self,
        job_id: JobId,
        result: WipeResult,
    ) -> Result<IngestedResult, OrchestratorError> {
        let conflict =
            || OrchestratorError::conflict(format!("result for job {job_id} already ingested"));
        if self.store.get_anchor(job_id).await?.is_some() {
            return Err(conflict());
        }
        let filter = CertificateFilter {
            job_id: Some(job_id),
            ..CertificateFilter::default()
        };
        let Some(certificate) = self.store.list_certificates(&filter).await?.into_iter().next()
        else {
            return Err(conflict());
        };

        tracing::warn!(
            job_id = %job_id,
            certificate_id = %certificate.id,
            "result stored without an anchor, queueing it now"
        );
        let anchor = self
            .anchors
            .enqueue_anchor(job_id, &certificate.hash, Utc::now())
            .await?;
        Ok(IngestedResult {
            result,
            certificate,
            anchor,
        })
    }

    // ── Certificates ────────────────────────────────────────────────

    /// Store an uploaded certificate with its verification verdict.
    ///
    /// Without a signature the certificate is PENDING.
    pub async fn upload_certificate(
        &self,
        actor: &Actor,
        upload: CertificateUpload,
    ) -> Result<Certificate, OrchestratorError> {
        let payload = parse_document(&upload.document)?;
        let outcome = self.verify_signature(&upload.document, upload.signature.as_deref());

        let now = Utc::now();
        let certificate = Certificate::issue(
            None,
            Some(upload.nist_category),
            payload,
            outcome.as_ref(),
            upload.artifacts,
            now,
        )
        .map_err(|e| OrchestratorError::validation(e.to_string()))?;
        self.store.insert_certificate(&certificate).await?;

        self.audit(certificate_event(
            AuditEventKind::CertificateUploaded,
            &certificate,
            actor,
            now,
        ))
        .await;
        Ok(certificate)
    }

    /// Fetch a certificate.
    pub async fn get_certificate(
        &self,
        id: CertificateId,
    ) -> Result<Certificate, OrchestratorError> {
        self.store
            .get_certificate(id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("certificate", id))
    }

    /// Certificates matching `filter`, newest first.
    pub async fn list_certificates(
        &self,
        filter: &CertificateFilter,
    ) -> Result<Vec<Certificate>, OrchestratorError> {
        Ok(self.store.list_certificates(filter).await?)
    }

    // ── Anchors ─────────────────────────────────────────────────────

    /// Queue (or re-queue) anchoring of a job-bound certificate.
    pub async fn anchor_certificate(
        &self,
        id: CertificateId,
    ) -> Result<BlockchainRecord, OrchestratorError> {
        let certificate = self.get_certificate(id).await?;
        let Some(job_id) = certificate.job_id else {
            return Err(OrchestratorError::validation(format!(
                "certificate {id} is not bound to a job and cannot be anchored"
            )));
        };
        Ok(self
            .anchors
            .enqueue_anchor(job_id, &certificate.hash, Utc::now())
            .await?)
    }

    /// Whether `tx_hash` is mined with a successful receipt.
    pub async fn verify_anchor(&self, tx_hash: &str) -> Result<bool, OrchestratorError> {
        Ok(self.anchors.verify_anchor(tx_hash).await?)
    }

    /// The anchor record carrying `tx_hash`, with the live ledger verdict.
    ///
    /// A record that is not yet CONFIRMED is reconciled when the ledger
    /// reports the transaction mined.
    pub async fn find_anchor(&self, tx_hash: &str) -> Result<AnchorLookup, OrchestratorError> {
        let record = self
            .store
            .find_anchor_by_tx(tx_hash)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("blockchain record", tx_hash))?;
        let verified = self.verify_anchor(tx_hash).await?;
        let record = if verified && record.status != AnchorStatus::Confirmed {
            self.anchors
                .reconcile(record.job_id)
                .await?
                .unwrap_or(record)
        } else {
            record
        };
        Ok(AnchorLookup { record, verified })
    }

    /// The anchor record of a job, reconciled against the ledger when a
    /// submitted transaction has since been mined.
    ///
    /// A ledger that cannot be reached leaves the stored record as is.
    pub async fn get_anchor(&self, job_id: JobId) -> Result<BlockchainRecord, OrchestratorError> {
        let record = match self.anchors.reconcile(job_id).await {
            Ok(record) => record,
            Err(AnchorError::Ledger(e)) => {
                tracing::warn!(%job_id, error = %e, "ledger unreachable, returning stored anchor");
                self.store.get_anchor(job_id).await?
            }
            Err(e) => return Err(e.into()),
        };
        record.ok_or_else(|| OrchestratorError::not_found("blockchain record", job_id))
    }

    fn verify_signature(
        &self,
        document: &[u8],
        signature: Option<&[u8]>,
    ) -> Option<VerificationOutcome> {
        let outcome = self.verifier.verify(document, signature?);
        let label = if outcome.valid { "valid" } else { "invalid" };
        metrics::counter!("trustwipe_certificates_verified_total", "outcome" => label)
            .increment(1);
        Some(outcome)
    }
}

fn parse_document(raw: &[u8]) -> Result<Value, OrchestratorError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| OrchestratorError::validation(format!("document is not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(OrchestratorError::validation(
            "document must be a JSON object",
        ));
    }
    Ok(value)
}

fn certificate_event(
    kind: AuditEventKind,
    certificate: &Certificate,
    actor: &Actor,
    now: DateTime<Utc>,
) -> AuditEvent {
    AuditEvent::new(kind, "certificate", certificate.id, now)
        .by(actor.label())
        .with_metadata(serde_json::json!({
            "hash": certificate.hash,
            "status": certificate.status.as_str(),
            "chainChecked": certificate.chain_checked,
            "jobId": certificate.job_id.map(|id| id.to_string()),
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_must_be_json_objects() {
        assert!(parse_document(br#"{"deviceInfo":{}}"#).is_ok());
        let err = parse_document(b"[1,2]").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert!(parse_document(b"not json").is_err());
    }
}
