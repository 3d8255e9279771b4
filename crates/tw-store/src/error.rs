//! Store error type shared by every backend.

use thiserror::Error;

/// PostgreSQL SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// Errors raised by [`crate::JobStore`] implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind, e.g. "job".
        kind: &'static str,
        /// Identifier as displayed.
        id: String,
    },

    /// A uniqueness rule or a compare-and-set precondition failed.
    #[error("conflict: {reason}")]
    Conflict {
        /// What collided.
        reason: String,
    },

    /// A persisted row could not be mapped back to a domain record.
    #[error("corrupt {table} row {id}: {reason}")]
    CorruptRow {
        /// Table name.
        table: &'static str,
        /// Row identifier.
        id: String,
        /// Decoding failure.
        reason: String,
    },

    /// JSON column encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other database failure.
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// Shorthand for [`StoreError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`StoreError::Conflict`].
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db) = e.as_database_error() {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let constraint = db.constraint().unwrap_or("unique constraint").to_string();
                return Self::Conflict {
                    reason: format!("duplicate value violates {constraint}"),
                };
            }
        }
        Self::Database(e)
    }
}
