//! Delivery errors.

use thiserror::Error;
use tw_core::{DeliveryId, DeliveryMethod, JobId, PartnerId};
use tw_queue::QueueError;
use tw_store::StoreError;

/// A transport attempt that did not hand the certificate over.
///
/// The display text is what ends up in `Delivery.last_error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The webhook answered with a non-2xx status.
    #[error("webhook failed: HTTP {status}")]
    WebhookStatus {
        /// Response status code.
        status: u16,
    },

    /// The partner API answered with a non-2xx status.
    #[error("API delivery failed: HTTP {status}")]
    ApiStatus {
        /// Response status code.
        status: u16,
    },

    /// The HTTP request itself failed (connect, TLS, timeout).
    #[error("HTTP request failed: {reason}")]
    Http {
        /// Underlying error.
        reason: String,
    },

    /// Building or sending the email failed.
    #[error("email delivery failed: {reason}")]
    Mail {
        /// Underlying error.
        reason: String,
    },

    /// No SMTP host is configured.
    #[error("SMTP transport not configured")]
    MailDisabled,
}

/// Failures of [`crate::DeliveryService`] operations and attempts.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The delivery row does not exist.
    #[error("delivery {id} not found")]
    DeliveryNotFound {
        /// Missing delivery.
        id: DeliveryId,
    },

    /// The partner row does not exist.
    #[error("partner {id} not found")]
    PartnerNotFound {
        /// Missing partner.
        id: PartnerId,
    },

    /// The job row does not exist.
    #[error("job {id} not found")]
    JobNotFound {
        /// Missing job.
        id: JobId,
    },

    /// The job has produced no certificate yet.
    #[error("job {job_id} has no certificate to deliver")]
    NoCertificate {
        /// Job without a certificate.
        job_id: JobId,
    },

    /// The partner lacks configuration for the method.
    #[error("partner {partner_id} is not configured for {method} delivery")]
    MethodNotConfigured {
        /// Partner.
        partner_id: PartnerId,
        /// Requested method.
        method: DeliveryMethod,
    },

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Enqueueing failed.
    #[error(transparent)]
    Queue(#[from] QueueError),
}
