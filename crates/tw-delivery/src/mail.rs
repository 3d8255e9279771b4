//! # Email Transport
//!
//! [`Mailer`] hides the SMTP client. [`SmtpMailer`] uses `lettre` with
//! STARTTLS; [`MemoryMailer`] records messages for tests. Without an SMTP
//! host, [`DisabledMailer`] fails every send so email deliveries end FAILED
//! with a visible reason instead of disappearing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use parking_lot::Mutex;

use crate::error::TransportError;

/// One outgoing message with a single attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
    /// Attachment file name.
    pub attachment_name: String,
    /// Attachment bytes (JSON).
    pub attachment: Vec<u8>,
}

/// Sends email.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Send `mail`.
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError>;
}

/// SMTP settings.
#[derive(Clone)]
pub struct SmtpConfig {
    /// Relay host.
    pub host: String,
    /// Relay port (587 for STARTTLS).
    pub port: u16,
    /// Login user.
    pub username: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// Sender address.
    pub from: String,
    /// Connection and command timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("from", &self.from)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// `lettre` SMTP client.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer").field("from", &self.from).finish()
    }
}

impl SmtpMailer {
    /// Build a STARTTLS transport from `config`.
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let from: Mailbox = config.from.parse().map_err(mail_error)?;
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(mail_error)?
            .port(config.port)
            .timeout(Some(config.timeout));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        let to: Mailbox = mail.to.parse().map_err(mail_error)?;
        let json = ContentType::parse("application/json").map_err(mail_error)?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::html(mail.html.clone()))
                    .singlepart(
                        Attachment::new(mail.attachment_name.clone())
                            .body(mail.attachment.clone(), json),
                    ),
            )
            .map_err(mail_error)?;

        self.transport.send(message).await.map_err(mail_error)?;
        Ok(())
    }
}

/// Fails every send with [`TransportError::MailDisabled`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _mail: &OutgoingMail) -> Result<(), TransportError> {
        Err(TransportError::MailDisabled)
    }
}

/// Records every message; optionally fails them all.
#[derive(Debug, Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
    failing: Arc<Mutex<Option<String>>>,
}

impl MemoryMailer {
    /// A mailer that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every later send with `reason`; `None` accepts again.
    pub fn set_failure(&self, reason: Option<&str>) {
        *self.failing.lock() = reason.map(str::to_string);
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        if let Some(reason) = self.failing.lock().clone() {
            return Err(TransportError::Mail { reason });
        }
        self.sent.lock().push(mail.clone());
        Ok(())
    }
}

fn mail_error(e: impl std::fmt::Display) -> TransportError {
    TransportError::Mail {
        reason: e.to_string(),
    }
}
