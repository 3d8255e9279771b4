//! # Worker Pools
//!
//! A [`WorkerPool`] pulls envelopes from one queue and runs a
//! [`TaskHandler`] on each, at most `concurrency` at a time. Every outcome
//! is written back to the queue before the permit is released:
//!
//! - success: COMPLETED;
//! - failure with budget left: PENDING again at `settled_at + backoff`,
//!   where `settled_at` is taken when the handler returns;
//! - failure on the last attempt, or an abandoned final lease:
//!   EXHAUSTED, then the [`ExhaustionObserver`] is told so it can persist
//!   the terminal failure on the owning record.
//!
//! [`WorkerPool::drain_once`] runs a single claim round at an explicit
//! time and is what the tests drive; [`WorkerPool::run`] loops until the
//! shutdown signal flips, reaping abandoned leases every `reap_interval`
//! whether or not the queue is busy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::envelope::{FailureOutcome, QueueName, TaskEnvelope};
use crate::error::QueueError;
use crate::queue::TaskQueue;

/// A failed handler attempt. Always retried while budget remains.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TaskError {
    /// Human-readable reason, persisted as the task's `last_error`.
    pub message: String,
}

impl TaskError {
    /// Wrap any displayable failure.
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Executes one task attempt. Must be safe to re-run.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Run the attempt described by `task`.
    async fn handle(&self, task: &TaskEnvelope) -> Result<(), TaskError>;
}

/// Told about every task that ends EXHAUSTED.
#[async_trait]
pub trait ExhaustionObserver: Send + Sync + 'static {
    /// `task.last_error` holds the final attempt's error.
    async fn on_exhausted(&self, task: &TaskEnvelope);
}

/// Pool tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Maximum attempts running at once.
    pub concurrency: usize,
    /// Sleep between empty claim rounds.
    pub poll_interval: Duration,
    /// Lease granted per claim; must exceed the handler's own timeouts.
    pub lease: Duration,
    /// How often `run` looks for abandoned final attempts.
    pub reap_interval: Duration,
}

impl WorkerConfig {
    /// Anchor pool: 5 concurrent attempts.
    pub fn anchor() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_millis(500),
            lease: Duration::from_secs(120),
            reap_interval: Duration::from_secs(30),
        }
    }

    /// Delivery pool: 3 concurrent attempts.
    pub fn delivery() -> Self {
        Self {
            concurrency: 3,
            poll_interval: Duration::from_millis(500),
            lease: Duration::from_secs(120),
            reap_interval: Duration::from_secs(30),
        }
    }
}

/// Source of the settlement timestamp.
#[derive(Debug, Clone, Copy)]
enum Clock {
    Wall,
    Fixed(DateTime<Utc>),
}

impl Clock {
    fn now(self) -> DateTime<Utc> {
        match self {
            Self::Wall => Utc::now(),
            Self::Fixed(at) => at,
        }
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Handler succeeded and the task is COMPLETED.
    Completed,
    /// Handler failed and the task was rescheduled.
    Retrying,
    /// Handler failed on the final attempt.
    Exhausted,
    /// The outcome could not be written (lease lost or store error).
    Unsettled,
}

/// Tally of one [`WorkerPool::drain_once`] round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Attempts started.
    pub claimed: usize,
    /// Attempts that completed their task.
    pub completed: usize,
    /// Attempts that failed with budget left.
    pub retrying: usize,
    /// Tasks exhausted by a failed attempt or an abandoned lease.
    pub exhausted: usize,
}

/// Bounded consumer of one queue.
#[derive(Clone)]
pub struct WorkerPool {
    queue_name: QueueName,
    queue: Arc<dyn TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    observer: Option<Arc<dyn ExhaustionObserver>>,
    config: WorkerConfig,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("queue", &self.queue_name)
            .field("config", &self.config)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

impl WorkerPool {
    /// A pool consuming `queue_name`.
    pub fn new(
        queue_name: QueueName,
        queue: Arc<dyn TaskQueue>,
        handler: Arc<dyn TaskHandler>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue_name,
            queue,
            handler,
            observer: None,
            config: WorkerConfig {
                concurrency: config.concurrency.max(1),
                ..config
            },
        }
    }

    /// Notify `observer` of exhausted tasks.
    pub fn with_observer(mut self, observer: Arc<dyn ExhaustionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Effective configuration.
    pub fn config(&self) -> WorkerConfig {
        self.config
    }

    /// Reap abandoned tasks, then claim up to `concurrency` tasks runnable
    /// at `now` and run them concurrently to completion. Outcomes are
    /// settled at `now` as well.
    pub async fn drain_once(&self, now: DateTime<Utc>) -> Result<DrainReport, QueueError> {
        let mut report = DrainReport {
            exhausted: self.reap(now).await?,
            ..DrainReport::default()
        };

        let mut set = JoinSet::new();
        while report.claimed < self.config.concurrency {
            let Some(task) = self.queue.claim(self.queue_name, now, self.config.lease).await?
            else {
                break;
            };
            report.claimed += 1;
            let pool = self.clone();
            set.spawn(async move { pool.attempt(task, Clock::Fixed(now)).await });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(AttemptOutcome::Completed) => report.completed += 1,
                Ok(AttemptOutcome::Retrying) => report.retrying += 1,
                Ok(AttemptOutcome::Exhausted) => report.exhausted += 1,
                Ok(AttemptOutcome::Unsettled) => {}
                Err(e) => tracing::error!(queue = %self.queue_name, error = %e, "task attempt panicked"),
            }
        }
        Ok(report)
    }

    /// Consume the queue until `shutdown` becomes `true`, then wait for
    /// in-flight attempts.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let concurrency = self.config.concurrency;
        let permits = Arc::new(Semaphore::new(concurrency));
        tracing::info!(queue = %self.queue_name, concurrency, "worker pool started");

        let mut next_reap = Instant::now();
        loop {
            if *shutdown.borrow() {
                break;
            }

            if Instant::now() >= next_reap {
                if let Err(e) = self.reap(Utc::now()).await {
                    tracing::error!(queue = %self.queue_name, error = %e, "reaping abandoned tasks failed");
                }
                next_reap = Instant::now() + self.config.reap_interval;
            }

            let permit = tokio::select! {
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            match self.queue.claim(self.queue_name, Utc::now(), self.config.lease).await {
                Ok(Some(task)) => {
                    let pool = self.clone();
                    tokio::spawn(async move {
                        pool.attempt(task, Clock::Wall).await;
                        drop(permit);
                    });
                    continue;
                }
                Ok(None) => drop(permit),
                Err(e) => {
                    drop(permit);
                    tracing::error!(queue = %self.queue_name, error = %e, "task claim failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        let in_flight = u32::try_from(concurrency).unwrap_or(u32::MAX);
        let _drained = permits.acquire_many(in_flight).await;
        tracing::info!(queue = %self.queue_name, "worker pool stopped");
    }

    /// Run one attempt and settle it at `clock`'s time once the handler
    /// has returned.
    async fn attempt(&self, task: TaskEnvelope, clock: Clock) -> AttemptOutcome {
        let queue = self.queue_name.as_str();

        let result = self.handler.handle(&task).await;
        let settled_at = clock.now();
        let error = match result {
            Ok(()) => {
                return match self.queue.complete(&task, settled_at).await {
                    Ok(()) => {
                        metrics::counter!("trustwipe_tasks_completed_total", "queue" => queue)
                            .increment(1);
                        tracing::debug!(queue, task_id = %task.id, attempt = task.attempts, "task completed");
                        AttemptOutcome::Completed
                    }
                    Err(e) => {
                        tracing::warn!(queue, task_id = %task.id, error = %e, "could not settle completed task");
                        AttemptOutcome::Unsettled
                    }
                };
            }
            Err(e) => e,
        };

        metrics::counter!("trustwipe_task_failures_total", "queue" => queue).increment(1);
        tracing::warn!(
            queue,
            task_id = %task.id,
            attempt = task.attempts,
            max_attempts = task.max_attempts,
            error = %error,
            "task attempt failed"
        );

        match self.queue.fail(&task, &error.message, settled_at).await {
            Ok((_, FailureOutcome::Retrying { next_run_at })) => {
                tracing::debug!(queue, task_id = %task.id, %next_run_at, "task rescheduled");
                AttemptOutcome::Retrying
            }
            Ok((settled, FailureOutcome::Exhausted)) => {
                self.exhausted(&settled).await;
                AttemptOutcome::Exhausted
            }
            Err(e) => {
                tracing::warn!(queue, task_id = %task.id, error = %e, "could not settle failed task");
                AttemptOutcome::Unsettled
            }
        }
    }

    /// Exhaust abandoned final attempts; returns how many there were.
    async fn reap(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        let abandoned = self.queue.reap_abandoned(self.queue_name, now).await?;
        for task in &abandoned {
            self.exhausted(task).await;
        }
        Ok(abandoned.len())
    }

    async fn exhausted(&self, task: &TaskEnvelope) {
        metrics::counter!("trustwipe_tasks_exhausted_total", "queue" => self.queue_name.as_str())
            .increment(1);
        tracing::error!(
            queue = %self.queue_name,
            task_id = %task.id,
            attempts = task.attempts,
            error = task.last_error.as_deref().unwrap_or(""),
            "task exhausted its retry budget"
        );
        if let Some(observer) = &self.observer {
            observer.on_exhausted(task).await;
        }
    }
}
