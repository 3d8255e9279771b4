//! # HTTP Transports
//!
//! Webhook and partner-API delivery over one `reqwest` client with a
//! bounded timeout. Anything but a 2xx answer is a failed attempt.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tw_core::JobId;
use tw_state::{Certificate, JobStatus};

use crate::error::TransportError;

/// Body POSTed to a partner webhook.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload<'a> {
    /// Job whose certificate is delivered.
    pub job_id: JobId,
    /// Job outcome (`completed`, `failed`, ...).
    pub status: String,
    /// The full certificate record.
    pub certificate: &'a Certificate,
    /// Send time.
    pub timestamp: DateTime<Utc>,
}

impl<'a> WebhookPayload<'a> {
    /// Payload for a job in `status`.
    pub fn new(
        job_id: JobId,
        status: JobStatus,
        certificate: &'a Certificate,
        now: DateTime<Utc>,
    ) -> Self {
        let status = match status {
            JobStatus::Succeeded => "completed".to_string(),
            other => other.as_str().to_ascii_lowercase(),
        };
        Self {
            job_id,
            status,
            certificate,
            timestamp: now,
        }
    }
}

/// Shared HTTP client for webhook and API delivery.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// A transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    /// POST `payload` to `url`.
    pub async fn post_webhook(
        &self,
        url: &str,
        payload: &WebhookPayload<'_>,
    ) -> Result<(), TransportError> {
        let resp = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(request_error)?;
        if !resp.status().is_success() {
            return Err(TransportError::WebhookStatus {
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    /// POST `certificate` to `{api_base}/certificates` with bearer auth.
    pub async fn post_certificate(
        &self,
        api_base: &str,
        api_key: &str,
        certificate: &Certificate,
    ) -> Result<(), TransportError> {
        let url = format!("{}/certificates", api_base.trim_end_matches('/'));
        let resp = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(certificate)
            .send()
            .await
            .map_err(request_error)?;
        if !resp.status().is_success() {
            return Err(TransportError::ApiStatus {
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}

fn request_error(e: reqwest::Error) -> TransportError {
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else {
        // Strip the URL; webhook URLs often embed secrets.
        e.without_url().to_string()
    };
    TransportError::Http { reason }
}
