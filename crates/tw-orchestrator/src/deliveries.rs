//! Partner registry and delivery requests.

use chrono::Utc;
use tw_core::{DeliveryId, DeliveryMethod, JobId, PartnerId};
use tw_state::{Actor, Delivery, NewPartner, Partner};
use tw_store::{AuditEvent, AuditEventKind, CertificateFilter};
use url::Url;

use crate::error::OrchestratorError;
use crate::orchestrator::JobOrchestrator;

impl JobOrchestrator {
    /// Register a recycler or consumer partner.
    pub async fn register_partner(
        &self,
        actor: &Actor,
        new: NewPartner,
    ) -> Result<Partner, OrchestratorError> {
        if !actor.can_manage_deliveries() {
            return Err(OrchestratorError::forbidden("agents may not register partners"));
        }
        if new.name.trim().is_empty() {
            return Err(OrchestratorError::validation("partner name must not be empty"));
        }
        if new.api_base.is_some() != new.api_key.is_some() {
            return Err(OrchestratorError::validation(
                "api base and api key must be configured together",
            ));
        }
        for (field, value) in [("webhook url", &new.webhook_url), ("api base", &new.api_base)] {
            if let Some(value) = value {
                check_http_url(field, value)?;
            }
        }
        if let Some(email) = &new.contact_email {
            if !email.contains('@') {
                return Err(OrchestratorError::validation(format!(
                    "invalid contact email {email:?}"
                )));
            }
        }
        let partner = Partner::new(new, Utc::now());
        self.store.insert_partner(&partner).await?;
        tracing::info!(partner_id = %partner.id, name = %partner.name, "partner registered");
        Ok(partner)
    }

    /// Record a PENDING delivery and queue its first attempt.
    ///
    /// The job must already have a certificate; there is nothing to
    /// deliver otherwise.
    pub async fn create_delivery(
        &self,
        actor: &Actor,
        job_id: JobId,
        partner_id: PartnerId,
        method: DeliveryMethod,
    ) -> Result<Delivery, OrchestratorError> {
        if !actor.can_manage_deliveries() {
            return Err(OrchestratorError::forbidden("agents may not request deliveries"));
        }
        let job = self.load_job(job_id).await?;
        let certified = CertificateFilter {
            job_id: Some(job.id),
            ..CertificateFilter::default()
        };
        if self.store.list_certificates(&certified).await?.is_empty() {
            return Err(OrchestratorError::validation(format!(
                "job {job_id} has no certificate to deliver"
            )));
        }
        let partner = self
            .store
            .get_partner(partner_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("partner", partner_id))?;
        if !partner.supports(method) {
            return Err(OrchestratorError::validation(format!(
                "partner {} is not configured for {method} delivery",
                partner.name
            )));
        }

        let now = Utc::now();
        let delivery = Delivery::new(job.id, partner.id, method, now);
        self.store.insert_delivery(&delivery).await?;
        self.audit(
            AuditEvent::new(AuditEventKind::DeliveryCreated, "delivery", delivery.id, now)
                .by(actor.label())
                .with_metadata(serde_json::json!({
                    "jobId": job.id.to_string(),
                    "partnerId": partner.id.to_string(),
                    "method": method.as_str(),
                })),
        )
        .await;

        self.deliveries.enqueue_delivery(delivery.id, now).await?;
        Ok(delivery)
    }

    /// Fetch a delivery.
    pub async fn get_delivery(&self, id: DeliveryId) -> Result<Delivery, OrchestratorError> {
        self.store
            .get_delivery(id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("delivery", id))
    }
}

fn check_http_url(field: &str, value: &str) -> Result<(), OrchestratorError> {
    let parsed = Url::parse(value)
        .map_err(|e| OrchestratorError::validation(format!("invalid {field} {value:?}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(OrchestratorError::validation(format!(
            "{field} must use http or https, got {}",
            parsed.scheme()
        )));
    }
    Ok(())
}
