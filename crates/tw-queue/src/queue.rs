//! # Queue Trait
//!
//! [`TaskQueue`] is the durable backing store of the worker pools and the
//! single source of truth for how many times a task has been attempted.
//!
//! ## Claim Tokens
//!
//! A claimed envelope's `attempts` value identifies the claim.
//! [`TaskQueue::complete`] and [`TaskQueue::fail`] only settle a task that
//! is still RUNNING under that attempt; a worker whose lease expired and
//! whose task was reclaimed gets [`QueueError::LeaseLost`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tw_core::TaskId;

use crate::envelope::{FailureOutcome, QueueName, TaskEnvelope, TaskPayload};
use crate::error::QueueError;

/// Durable at-least-once task storage.
#[async_trait]
pub trait TaskQueue: Send + Sync + 'static {
    /// Round-trip to the backing store.
    async fn ping(&self) -> Result<(), QueueError>;

    /// Store a new PENDING envelope.
    async fn enqueue(&self, task: &TaskEnvelope) -> Result<(), QueueError>;

    /// Atomically claim the next runnable task of `queue`, incrementing
    /// its attempt count and leasing it until `now + lease`.
    async fn claim(
        &self,
        queue: QueueName,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<TaskEnvelope>, QueueError>;

    /// Settle a claimed task as COMPLETED.
    async fn complete(&self, task: &TaskEnvelope, now: DateTime<Utc>) -> Result<(), QueueError>;

    /// Record a failed attempt; reschedules with backoff or exhausts the
    /// task. Returns the stored envelope after the change.
    async fn fail(
        &self,
        task: &TaskEnvelope,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(TaskEnvelope, FailureOutcome), QueueError>;

    /// Exhaust every task of `queue` abandoned on its final attempt.
    async fn reap_abandoned(
        &self,
        queue: QueueName,
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskEnvelope>, QueueError>;

    /// Fetch a task.
    async fn get(&self, id: TaskId) -> Result<Option<TaskEnvelope>, QueueError>;
}

/// Wrap `payload` in an envelope with its queue's default policy and
/// enqueue it.
pub async fn submit(
    queue: &dyn TaskQueue,
    payload: TaskPayload,
    now: DateTime<Utc>,
) -> Result<TaskEnvelope, QueueError> {
    let task = TaskEnvelope::new(payload, now);
    queue.enqueue(&task).await?;

    metrics::counter!("trustwipe_tasks_enqueued_total", "queue" => task.queue.as_str())
        .increment(1);
    tracing::info!(
        queue = %task.queue,
        task_id = %task.id,
        max_attempts = task.max_attempts,
        "task enqueued"
    );
    Ok(task)
}
