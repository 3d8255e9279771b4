//! Queue error type.

use thiserror::Error;
use tw_core::TaskId;

/// Errors raised by [`crate::TaskQueue`] implementations.
#[derive(Error, Debug)]
pub enum QueueError {
    /// No task with this ID exists.
    #[error("task {id} not found")]
    NotFound {
        /// Missing task.
        id: TaskId,
    },

    /// The task is no longer held by this claim: its lease expired and
    /// another worker reclaimed it, or it was already settled.
    #[error("task {id} is no longer held by attempt {attempt}")]
    LeaseLost {
        /// Task.
        id: TaskId,
        /// Attempt number of the stale claim.
        attempt: u32,
    },

    /// A stored envelope could not be decoded.
    #[error("corrupt task {id}: {reason}")]
    Corrupt {
        /// Task row identifier.
        id: String,
        /// Decoding failure.
        reason: String,
    },

    /// Payload encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backing store failure.
    #[error("queue database error: {0}")]
    Database(#[from] sqlx::Error),
}
