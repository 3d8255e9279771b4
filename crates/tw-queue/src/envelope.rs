//! # Task Envelopes
//!
//! A [`TaskEnvelope`] carries its payload together with every piece of
//! retry state: attempt count, budget, base delay, next run time, lease,
//! and last error. Workers keep nothing in memory between attempts, so a
//! restart never loses or resets an attempt count.
//!
//! ## Lifecycle
//!
//! ```text
//! PENDING --claim--> RUNNING --complete--> COMPLETED
//!    ^                  |
//!    +----fail (budget left)
//!                       +--fail (budget spent) / lease expired on last attempt--> EXHAUSTED
//! ```
//!
//! `attempts` is incremented at claim time, so an attempt that crashes its
//! worker still counts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tw_core::{DeliveryId, JobId, ParseEnumError, TaskId};

/// Error recorded when a final-attempt lease expires without an outcome.
pub const LEASE_EXPIRED_ERROR: &str = "worker lease expired during final attempt";

// ─── Queues ──────────────────────────────────────────────────────────

/// The independent work queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    /// Ledger anchoring of certificate hashes.
    Anchor,
    /// Certificate handoff to partners.
    Delivery,
}

impl QueueName {
    /// Wire and metric label name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anchor => "anchor",
            Self::Delivery => "delivery",
        }
    }

    /// Retry policy applied to new tasks on this queue.
    pub fn default_policy(&self) -> RetryPolicy {
        match self {
            Self::Anchor => RetryPolicy::ANCHOR,
            Self::Delivery => RetryPolicy::DELIVERY,
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueName {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anchor" => Ok(Self::Anchor),
            "delivery" => Ok(Self::Delivery),
            _ => Err(ParseEnumError::new("queue", s)),
        }
    }
}

// ─── Payloads ────────────────────────────────────────────────────────

/// Typed unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPayload {
    /// Anchor `cert_hash` for `job_id`.
    #[serde(rename_all = "camelCase")]
    Anchor {
        /// Job owning the anchor record.
        job_id: JobId,
        /// Certificate content hash (lowercase hex).
        cert_hash: String,
    },
    /// Dispatch an existing delivery row.
    #[serde(rename_all = "camelCase")]
    Delivery {
        /// Delivery to dispatch.
        delivery_id: DeliveryId,
    },
}

impl TaskPayload {
    /// The queue this payload belongs on.
    pub fn queue(&self) -> QueueName {
        match self {
            Self::Anchor { .. } => QueueName::Anchor,
            Self::Delivery { .. } => QueueName::Delivery,
        }
    }
}

// ─── Retry Policy ────────────────────────────────────────────────────

/// Attempt budget and exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each later one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Anchor queue: 3 attempts, 2 s base delay.
    pub const ANCHOR: Self = Self {
        max_attempts: 3,
        base_delay: Duration::from_secs(2),
    };

    /// Delivery queue: 5 attempts, 5 s base delay.
    pub const DELIVERY: Self = Self {
        max_attempts: 5,
        base_delay: Duration::from_secs(5),
    };

    /// Delay after the `attempts`-th failed attempt: `base * 2^(attempts-1)`.
    pub fn delay_after(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

// ─── Status ──────────────────────────────────────────────────────────

/// Where a task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting for `run_at`.
    Pending,
    /// Claimed by a worker until `lease_until`.
    Running,
    /// Handler succeeded.
    Completed,
    /// Attempt budget spent; permanently failed.
    Exhausted,
}

impl TaskStatus {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Exhausted => "EXHAUSTED",
        }
    }

    /// No further attempt will be made.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Exhausted)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "EXHAUSTED" => Ok(Self::Exhausted),
            _ => Err(ParseEnumError::new("task status", s)),
        }
    }
}

// ─── Envelope ────────────────────────────────────────────────────────

/// Result of recording a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Budget remains; the task runs again at `next_run_at`.
    Retrying {
        /// Scheduled time of the next attempt.
        next_run_at: DateTime<Utc>,
    },
    /// Budget spent; the envelope is now EXHAUSTED.
    Exhausted,
}

/// A queued task with its durable retry state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEnvelope {
    /// Unique task identifier.
    pub id: TaskId,
    /// Owning queue.
    pub queue: QueueName,
    /// Work description.
    pub payload: TaskPayload,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Attempts started so far.
    pub attempts: u32,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Backoff base in milliseconds.
    pub base_delay_ms: u64,
    /// Earliest time the next attempt may start.
    pub run_at: DateTime<Utc>,
    /// End of the current claim.
    pub lease_until: Option<DateTime<Utc>>,
    /// Error of the most recent failed attempt.
    pub last_error: Option<String>,
    /// Enqueue time.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl TaskEnvelope {
    /// A PENDING task runnable immediately, on the payload's queue with
    /// that queue's default policy.
    pub fn new(payload: TaskPayload, now: DateTime<Utc>) -> Self {
        let queue = payload.queue();
        Self::with_policy(payload, queue.default_policy(), now)
    }

    /// A PENDING task with an explicit policy.
    pub fn with_policy(payload: TaskPayload, policy: RetryPolicy, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::new(),
            queue: payload.queue(),
            payload,
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts: policy.max_attempts,
            base_delay_ms: u64::try_from(policy.base_delay.as_millis()).unwrap_or(u64::MAX),
            run_at: now,
            lease_until: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The retry policy stored on the envelope.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }

    /// Whether a worker may claim the task at `now`.
    ///
    /// A RUNNING task whose lease has expired is claimable again while
    /// budget remains.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        if self.attempts >= self.max_attempts {
            return false;
        }
        match self.status {
            TaskStatus::Pending => self.run_at <= now,
            TaskStatus::Running => self.lease_expired(now),
            TaskStatus::Completed | TaskStatus::Exhausted => false,
        }
    }

    /// Whether the task is RUNNING on its final attempt with an expired
    /// lease, so no worker will ever settle it.
    pub fn is_abandoned(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Running
            && self.attempts >= self.max_attempts
            && self.lease_expired(now)
    }

    fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.lease_until.map_or(true, |until| until < now)
    }

    /// Start an attempt: RUNNING, attempts + 1, lease until `now + lease`.
    pub fn claim(&mut self, now: DateTime<Utc>, lease: Duration) {
        self.status = TaskStatus::Running;
        self.attempts += 1;
        self.lease_until = Some(add(now, lease));
        self.updated_at = now;
    }

    /// Settle the current attempt as successful.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.lease_until = None;
        self.updated_at = now;
    }

    /// Settle the current attempt as failed and schedule the next one.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> FailureOutcome {
        self.last_error = Some(error.into());
        self.lease_until = None;
        self.updated_at = now;
        if self.attempts >= self.max_attempts {
            self.status = TaskStatus::Exhausted;
            return FailureOutcome::Exhausted;
        }
        let next_run_at = add(now, self.policy().delay_after(self.attempts));
        self.status = TaskStatus::Pending;
        self.run_at = next_run_at;
        FailureOutcome::Retrying { next_run_at }
    }

    /// Mark an abandoned final attempt as EXHAUSTED.
    pub fn abandon(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Exhausted;
        self.lease_until = None;
        self.last_error = Some(LEASE_EXPIRED_ERROR.to_string());
        self.updated_at = now;
    }
}

fn add(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
