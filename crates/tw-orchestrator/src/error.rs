//! # Orchestrator Errors
//!
//! The boundary error taxonomy. Every variant carries a stable machine
//! code and an HTTP status so a transport layer can render
//! `{ "error": { "code", "message" } }` without inspecting internals.
//!
//! Verification failures are not errors: an invalid signature is a
//! certificate with status INVALID.

use thiserror::Error;
use tw_anchor::AnchorError;
use tw_delivery::DeliveryError;
use tw_policy::PolicyError;
use tw_queue::QueueError;
use tw_state::JobError;
use tw_store::StoreError;

/// Errors returned by [`crate::JobOrchestrator`] operations.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Malformed input, rejected before any state mutation.
    #[error("validation failed: {reason}")]
    Validation {
        /// What was wrong with the input.
        reason: String,
    },

    /// The actor may not perform the operation.
    #[error("forbidden: {reason}")]
    Authorization {
        /// Why the actor was refused.
        reason: String,
    },

    /// A referenced entity does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind, e.g. "job".
        kind: &'static str,
        /// Identifier as displayed.
        id: String,
    },

    /// Duplicate, lost race, or a transition out of a terminal state.
    #[error("conflict: {reason}")]
    Conflict {
        /// What collided.
        reason: String,
    },

    /// A network or broker call failed; retrying may succeed.
    #[error("transient I/O failure: {reason}")]
    TransientIo {
        /// Underlying failure.
        reason: String,
    },

    /// A background task spent its retry budget.
    #[error("task {task_id} on queue {queue} exhausted its retries: {reason}")]
    TerminalTask {
        /// Queue name.
        queue: String,
        /// Task identifier.
        task_id: String,
        /// Last attempt's error.
        reason: String,
    },

    /// Any other persistence failure.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl OrchestratorError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub(crate) fn forbidden(reason: impl Into<String>) -> Self {
        Self::Authorization {
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_FAILED",
            Self::Authorization { .. } => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::TransientIo { .. } => "TRANSIENT_IO",
            Self::TerminalTask { .. } => "TASK_EXHAUSTED",
            Self::Store(_) => "INTERNAL",
        }
    }

    /// HTTP status a transport layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 422,
            Self::Authorization { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::TransientIo { .. } => 503,
            Self::TerminalTask { .. } | Self::Store(_) => 500,
        }
    }

    /// Structured error body.
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}

impl From<StoreError> for OrchestratorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { kind, id } => Self::NotFound { kind, id },
            StoreError::Conflict { reason } => Self::Conflict { reason },
            other => Self::Store(other),
        }
    }
}

impl From<JobError> for OrchestratorError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::ProgressOutOfRange { .. } => Self::validation(e.to_string()),
            JobError::Terminal { .. } | JobError::InvalidTransition { .. } => {
                Self::conflict(e.to_string())
            }
        }
    }
}

impl From<PolicyError> for OrchestratorError {
    fn from(e: PolicyError) -> Self {
        Self::validation(e.to_string())
    }
}

impl From<QueueError> for OrchestratorError {
    fn from(e: QueueError) -> Self {
        Self::TransientIo {
            reason: e.to_string(),
        }
    }
}

impl From<AnchorError> for OrchestratorError {
    fn from(e: AnchorError) -> Self {
        match e {
            AnchorError::InvalidHash { .. } => Self::validation(e.to_string()),
            AnchorError::Store(store) => store.into(),
            AnchorError::Queue(queue) => queue.into(),
            other => Self::TransientIo {
                reason: other.to_string(),
            },
        }
    }
}

impl From<DeliveryError> for OrchestratorError {
    fn from(e: DeliveryError) -> Self {
        match e {
            DeliveryError::DeliveryNotFound { id } => Self::not_found("delivery", id),
            DeliveryError::PartnerNotFound { id } => Self::not_found("partner", id),
            DeliveryError::JobNotFound { id } => Self::not_found("job", id),
            DeliveryError::NoCertificate { .. } | DeliveryError::MethodNotConfigured { .. } => {
                Self::validation(e.to_string())
            }
            DeliveryError::Store(store) => store.into(),
            DeliveryError::Queue(queue) => queue.into(),
            DeliveryError::Transport(transport) => Self::TransientIo {
                reason: transport.to_string(),
            },
        }
    }
}
