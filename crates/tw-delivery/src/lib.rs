//! # tw-delivery: Certificate Handoff
//!
//! Delivers a finished job's certificate to a recycler partner:
//!
//! - **WEBHOOK**: POST `{jobId, status, certificate, timestamp}` to the
//!   partner's webhook URL.
//! - **EMAIL**: SMTP message with `certificate.json` attached.
//! - **API**: POST the certificate to `{apiBase}/certificates` with bearer
//!   authentication.
//!
//! [`DeliveryService`] is both the delivery queue's task handler and its
//! exhaustion observer.

pub mod error;
pub mod http;
pub mod mail;
pub mod service;

pub use error::{DeliveryError, TransportError};
pub use http::{HttpTransport, WebhookPayload};
pub use mail::{DisabledMailer, Mailer, MemoryMailer, OutgoingMail, SmtpConfig, SmtpMailer};
pub use service::DeliveryService;
