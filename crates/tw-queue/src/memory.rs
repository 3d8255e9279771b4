//! In-memory [`TaskQueue`] backed by one `parking_lot::Mutex`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tw_core::TaskId;

use crate::envelope::{FailureOutcome, QueueName, TaskEnvelope, TaskStatus};
use crate::error::QueueError;
use crate::queue::TaskQueue;

/// Process-local queue with the same claim and settle rules as
/// [`crate::PgQueue`].
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    tasks: Arc<Mutex<HashMap<TaskId, TaskEnvelope>>>,
}

impl MemoryQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every task of `queue`, oldest first.
    pub fn snapshot(&self, queue: QueueName) -> Vec<TaskEnvelope> {
        let mut tasks: Vec<TaskEnvelope> = self
            .tasks
            .lock()
            .values()
            .filter(|t| t.queue == queue)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }

    /// Number of tasks of `queue` in `status`.
    pub fn count(&self, queue: QueueName, status: TaskStatus) -> usize {
        self.tasks
            .lock()
            .values()
            .filter(|t| t.queue == queue && t.status == status)
            .count()
    }

    fn held<'a>(
        tasks: &'a mut HashMap<TaskId, TaskEnvelope>,
        claim: &TaskEnvelope,
    ) -> Result<&'a mut TaskEnvelope, QueueError> {
        let stored = tasks
            .get_mut(&claim.id)
            .ok_or(QueueError::NotFound { id: claim.id })?;
        if stored.status != TaskStatus::Running || stored.attempts != claim.attempts {
            return Err(QueueError::LeaseLost {
                id: claim.id,
                attempt: claim.attempts,
            });
        }
        Ok(stored)
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }

    async fn enqueue(&self, task: &TaskEnvelope) -> Result<(), QueueError> {
        self.tasks.lock().insert(task.id, task.clone());
        Ok(())
    }

    async fn claim(
        &self,
        queue: QueueName,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<TaskEnvelope>, QueueError> {
        let mut tasks = self.tasks.lock();
        let next = tasks
            .values()
            .filter(|t| t.queue == queue && t.is_claimable(now))
            .min_by(|a, b| {
                a.run_at
                    .cmp(&b.run_at)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            })
            .map(|t| t.id);

        Ok(next.and_then(|id| {
            tasks.get_mut(&id).map(|task| {
                task.claim(now, lease);
                task.clone()
            })
        }))
    }

    async fn complete(&self, task: &TaskEnvelope, now: DateTime<Utc>) -> Result<(), QueueError> {
        let mut tasks = self.tasks.lock();
        Self::held(&mut tasks, task)?.complete(now);
        Ok(())
    }

    async fn fail(
        &self,
        task: &TaskEnvelope,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(TaskEnvelope, FailureOutcome), QueueError> {
        let mut tasks = self.tasks.lock();
        let stored = Self::held(&mut tasks, task)?;
        let outcome = stored.record_failure(error, now);
        Ok((stored.clone(), outcome))
    }

    async fn reap_abandoned(
        &self,
        queue: QueueName,
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskEnvelope>, QueueError> {
        let mut tasks = self.tasks.lock();
        Ok(tasks
            .values_mut()
            .filter(|t| t.queue == queue && t.is_abandoned(now))
            .map(|t| {
                t.abandon(now);
                t.clone()
            })
            .collect())
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskEnvelope>, QueueError> {
        Ok(self.tasks.lock().get(&id).cloned())
    }
}
