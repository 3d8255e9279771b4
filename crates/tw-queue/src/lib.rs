//! # tw-queue: Durable Background Work
//!
//! Two independent queues (anchor and delivery) with at-least-once
//! semantics. Retry state lives on the persisted [`TaskEnvelope`], never in
//! worker memory, and every attempt either completes, reschedules with
//! exponential backoff, or exhausts the task and notifies an
//! [`ExhaustionObserver`].
//!
//! ## Backends
//!
//! - [`PgQueue`]: the `task_queue` table, claimed with
//!   `FOR UPDATE SKIP LOCKED`.
//! - [`MemoryQueue`]: a process-local map with identical rules, used by
//!   tests and the degraded single-node mode.

pub mod envelope;
pub mod error;
pub mod memory;
pub mod pg;
pub mod queue;
pub mod worker;

pub use envelope::{
    FailureOutcome, QueueName, RetryPolicy, TaskEnvelope, TaskPayload, TaskStatus,
    LEASE_EXPIRED_ERROR,
};
pub use error::QueueError;
pub use memory::MemoryQueue;
pub use pg::PgQueue;
pub use queue::{submit, TaskQueue};
pub use worker::{
    AttemptOutcome, DrainReport, ExhaustionObserver, TaskError, TaskHandler, WorkerConfig,
    WorkerPool,
};
