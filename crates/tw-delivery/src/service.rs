//! # Delivery Service
//!
//! Hands a job's certificate to a partner over the delivery's method.
//! Every attempt is recorded on the [`Delivery`] row before the task is
//! settled: success marks it DELIVERED, failure marks it FAILED with the
//! error and hands that error to the queue for retry. A DELIVERED row is
//! never dispatched again, so a redelivered task is harmless.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tw_core::{DeliveryId, DeliveryMethod};
use tw_queue::{ExhaustionObserver, TaskEnvelope, TaskError, TaskHandler, TaskPayload, TaskQueue};
use tw_state::{Delivery, DeliveryStatus};
use tw_store::{record_or_log, AuditEvent, AuditEventKind, AuditSink, CertificateFilter, JobStore};

use crate::error::{DeliveryError, TransportError};
use crate::http::{HttpTransport, WebhookPayload};
use crate::mail::{Mailer, OutgoingMail};

const RESOURCE: &str = "delivery";
const EMAIL_BODY: &str = "<p>Wipe job completed. Certificate attached.</p>";
const ATTACHMENT_NAME: &str = "certificate.json";

/// Delivery enqueue and task handling.
#[derive(Clone)]
pub struct DeliveryService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    http: HttpTransport,
    mailer: Arc<dyn Mailer>,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for DeliveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryService")
            .field("http", &self.http)
            .finish_non_exhaustive()
    }
}

impl DeliveryService {
    /// Wire the service to its collaborators.
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        http: HttpTransport,
        mailer: Arc<dyn Mailer>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            queue,
            http,
            mailer,
            audit,
        }
    }

    /// Enqueue dispatch of an existing delivery row.
    pub async fn enqueue_delivery(
        &self,
        delivery_id: DeliveryId,
        now: DateTime<Utc>,
    ) -> Result<TaskEnvelope, DeliveryError> {
        if self.store.get_delivery(delivery_id).await?.is_none() {
            return Err(DeliveryError::DeliveryNotFound { id: delivery_id });
        }
        let task =
            tw_queue::submit(self.queue.as_ref(), TaskPayload::Delivery { delivery_id }, now)
                .await?;
        Ok(task)
    }

    /// Send the certificate once over the delivery's method.
    async fn dispatch(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        let partner = self
            .store
            .get_partner(delivery.partner_id)
            .await?
            .ok_or(DeliveryError::PartnerNotFound {
                id: delivery.partner_id,
            })?;
        let job = self
            .store
            .get_job(delivery.job_id)
            .await?
            .ok_or(DeliveryError::JobNotFound {
                id: delivery.job_id,
            })?;
        let certificate = self
            .store
            .list_certificates(&CertificateFilter {
                job_id: Some(job.id),
                ..CertificateFilter::default()
            })
            .await?
            .into_iter()
            .next()
            .ok_or(DeliveryError::NoCertificate { job_id: job.id })?;

        let not_configured = || DeliveryError::MethodNotConfigured {
            partner_id: partner.id,
            method: delivery.method,
        };

        match delivery.method {
            DeliveryMethod::Webhook => {
                let url = partner.webhook_url.as_deref().ok_or_else(not_configured)?;
                let payload = WebhookPayload::new(job.id, job.status, &certificate, Utc::now());
                self.http.post_webhook(url, &payload).await?;
            }
            DeliveryMethod::Email => {
                let to = partner.contact_email.clone().ok_or_else(not_configured)?;
                let attachment = serde_json::to_vec_pretty(&certificate.payload).map_err(|e| {
                    TransportError::Mail {
                        reason: format!("failed to encode certificate: {e}"),
                    }
                })?;
                let mail = OutgoingMail {
                    to,
                    subject: format!("Wipe Certificate - Job {}", job.id.as_uuid()),
                    html: EMAIL_BODY.to_string(),
                    attachment_name: ATTACHMENT_NAME.to_string(),
                    attachment,
                };
                self.mailer.send(&mail).await?;
            }
            DeliveryMethod::Api => {
                let (Some(api_base), Some(api_key)) = (&partner.api_base, &partner.api_key) else {
                    return Err(not_configured());
                };
                self.http
                    .post_certificate(api_base, api_key, &certificate)
                    .await?;
            }
        }
        Ok(())
    }

    async fn attempt(&self, delivery_id: DeliveryId) -> Result<(), TaskError> {
        let mut delivery = self
            .store
            .get_delivery(delivery_id)
            .await
            .map_err(TaskError::new)?
            .ok_or_else(|| TaskError::new(DeliveryError::DeliveryNotFound { id: delivery_id }))?;

        if delivery.status == DeliveryStatus::Delivered {
            tracing::debug!(%delivery_id, "delivery already completed");
            return Ok(());
        }

        let outcome = self.dispatch(&delivery).await;
        let now = Utc::now();
        match outcome {
            Ok(()) => {
                delivery.record_success(now);
                self.store
                    .save_delivery(&delivery)
                    .await
                    .map_err(TaskError::new)?;
                tracing::info!(
                    %delivery_id,
                    method = %delivery.method,
                    attempts = delivery.attempts,
                    "certificate delivered"
                );
                record_or_log(
                    self.audit.as_ref(),
                    AuditEvent::new(AuditEventKind::DeliveryCompleted, RESOURCE, delivery_id, now)
                        .by("system")
                        .with_metadata(serde_json::json!({
                            "method": delivery.method,
                            "attempts": delivery.attempts,
                        })),
                )
                .await;
                Ok(())
            }
            Err(e) => {
                delivery.record_failure(e.to_string(), now);
                if let Err(store_err) = self.store.save_delivery(&delivery).await {
                    tracing::error!(%delivery_id, error = %store_err, "failed to persist delivery failure");
                }
                Err(TaskError::new(e))
            }
        }
    }
}

#[async_trait]
impl TaskHandler for DeliveryService {
    async fn handle(&self, task: &TaskEnvelope) -> Result<(), TaskError> {
        match &task.payload {
            TaskPayload::Delivery { delivery_id } => self.attempt(*delivery_id).await,
            other => Err(TaskError::new(format!(
                "{} payload on the delivery queue",
                other.queue()
            ))),
        }
    }
}

#[async_trait]
impl ExhaustionObserver for DeliveryService {
    async fn on_exhausted(&self, task: &TaskEnvelope) {
        let TaskPayload::Delivery { delivery_id } = &task.payload else {
            return;
        };
        let error = task.last_error.clone().unwrap_or_default();
        let now = Utc::now();

        match self.store.get_delivery(*delivery_id).await {
            // An abandoned final attempt never reached the row.
            Ok(Some(mut delivery)) if delivery.attempts < task.attempts => {
                delivery.record_failure(error.clone(), now);
                if let Err(e) = self.store.save_delivery(&delivery).await {
                    tracing::error!(%delivery_id, error = %e, "failed to persist exhausted delivery");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!(%delivery_id, error = %e, "failed to load exhausted delivery"),
        }

        record_or_log(
            self.audit.as_ref(),
            AuditEvent::new(AuditEventKind::DeliveryFailed, RESOURCE, delivery_id, now)
                .by("system")
                .with_metadata(serde_json::json!({
                    "attempts": task.attempts,
                    "error": error,
                })),
        )
        .await;
    }
}
