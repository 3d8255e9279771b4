//! Worker pool behavior against the in-memory queue, with time driven
//! explicitly through `drain_once`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tw_core::{DeliveryId, JobId};
use tw_queue::{
    submit, DrainReport, ExhaustionObserver, MemoryQueue, QueueError, QueueName, RetryPolicy,
    TaskEnvelope, TaskError, TaskHandler, TaskPayload, TaskQueue, TaskStatus, WorkerConfig,
    WorkerPool, LEASE_EXPIRED_ERROR,
};

struct Flaky {
    fail_first: u32,
    calls: AtomicU32,
}

impl Flaky {
    fn new(fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            fail_first,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl TaskHandler for Flaky {
    async fn handle(&self, _task: &TaskEnvelope) -> Result<(), TaskError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_first {
            return Err(TaskError::new(format!("rpc unavailable (call {call})")));
        }
        Ok(())
    }
}

/// Fails its first call after `work`, then succeeds; records when each
/// call started and finished.
struct Slow {
    work: Duration,
    spans: Mutex<Vec<(Instant, Instant)>>,
}

#[async_trait]
impl TaskHandler for Slow {
    async fn handle(&self, _task: &TaskEnvelope) -> Result<(), TaskError> {
        let started = Instant::now();
        tokio::time::sleep(self.work).await;
        let mut spans = self.spans.lock();
        spans.push((started, Instant::now()));
        if spans.len() == 1 {
            return Err(TaskError::new("upstream timed out"));
        }
        Ok(())
    }
}

/// Succeeds after `work`.
struct Busy {
    work: Duration,
}

#[async_trait]
impl TaskHandler for Busy {
    async fn handle(&self, _task: &TaskEnvelope) -> Result<(), TaskError> {
        tokio::time::sleep(self.work).await;
        Ok(())
    }
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<TaskEnvelope>>,
}

#[async_trait]
impl ExhaustionObserver for Recorder {
    async fn on_exhausted(&self, task: &TaskEnvelope) {
        self.seen.lock().push(task.clone());
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn secs(n: i64) -> chrono::Duration {
    chrono::Duration::seconds(n)
}

fn anchor_payload() -> TaskPayload {
    TaskPayload::Anchor {
        job_id: JobId::new(),
        cert_hash: "ab".repeat(32),
    }
}

fn pool(queue: &MemoryQueue, handler: Arc<dyn TaskHandler>, concurrency: usize) -> WorkerPool {
    WorkerPool::new(
        QueueName::Anchor,
        Arc::new(queue.clone()),
        handler,
        WorkerConfig {
            concurrency,
            poll_interval: Duration::from_millis(10),
            lease: Duration::from_secs(60),
            reap_interval: Duration::from_millis(20),
        },
    )
}

#[tokio::test]
async fn transient_failures_recover_within_budget() {
    let queue = MemoryQueue::new();
    let handler = Flaky::new(2);
    let workers = pool(&queue, handler.clone(), 5);
    let task = submit(&queue, anchor_payload(), t0()).await.unwrap();
    assert_eq!(task.max_attempts, RetryPolicy::ANCHOR.max_attempts);

    let first = workers.drain_once(t0()).await.unwrap();
    assert_eq!(first.retrying, 1);

    // Backoff is 2 s after the first failure; nothing is runnable before.
    let early = workers.drain_once(t0() + secs(1)).await.unwrap();
    assert_eq!(early, DrainReport::default());

    let second = workers.drain_once(t0() + secs(2)).await.unwrap();
    assert_eq!(second.retrying, 1);
    let stored = queue.get(task.id).await.unwrap().unwrap();
    assert_eq!(stored.run_at, t0() + secs(2) + secs(4));

    let third = workers.drain_once(t0() + secs(6)).await.unwrap();
    assert_eq!(third.completed, 1);

    let stored = queue.get(task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.attempts, 3);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhaustion_notifies_observer_with_last_error() {
    let queue = MemoryQueue::new();
    let recorder = Arc::new(Recorder::default());
    let workers = pool(&queue, Flaky::new(u32::MAX), 5).with_observer(recorder.clone());
    let task = submit(&queue, anchor_payload(), t0()).await.unwrap();

    let mut now = t0();
    let mut exhausted = 0;
    for _ in 0..10 {
        exhausted += workers.drain_once(now).await.unwrap().exhausted;
        now += secs(60);
    }
    assert_eq!(exhausted, 1);

    let stored = queue.get(task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Exhausted);
    assert_eq!(stored.attempts, 3);
    assert_eq!(stored.last_error.as_deref(), Some("rpc unavailable (call 3)"));

    let seen = recorder.seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].id, task.id);
    assert_eq!(seen[0].last_error, stored.last_error);
}

#[tokio::test]
async fn claim_round_is_bounded_by_concurrency() {
    let queue = MemoryQueue::new();
    let workers = pool(&queue, Flaky::new(0), 3);
    for _ in 0..7 {
        submit(&queue, anchor_payload(), t0()).await.unwrap();
    }

    let report = workers.drain_once(t0()).await.unwrap();
    assert_eq!(report.claimed, 3);
    assert_eq!(report.completed, 3);
    assert_eq!(queue.count(QueueName::Anchor, TaskStatus::Pending), 4);
}

#[tokio::test]
async fn queues_are_independent() {
    let queue = MemoryQueue::new();
    let workers = pool(&queue, Flaky::new(0), 5);
    submit(
        &queue,
        TaskPayload::Delivery {
            delivery_id: DeliveryId::new(),
        },
        t0(),
    )
    .await
    .unwrap();

    let report = workers.drain_once(t0()).await.unwrap();
    assert_eq!(report.claimed, 0);
    let delivery = queue.snapshot(QueueName::Delivery);
    assert_eq!(delivery[0].max_attempts, RetryPolicy::DELIVERY.max_attempts);
}

#[tokio::test]
async fn expired_lease_is_redelivered_and_stale_claim_is_rejected() {
    let queue = MemoryQueue::new();
    submit(&queue, anchor_payload(), t0()).await.unwrap();

    let stale = queue
        .claim(QueueName::Anchor, t0(), Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stale.attempts, 1);

    let workers = pool(&queue, Flaky::new(0), 1);
    let report = workers.drain_once(t0() + secs(31)).await.unwrap();
    assert_eq!(report.completed, 1);

    let stored = queue.get(stale.id).await.unwrap().unwrap();
    assert_eq!(stored.attempts, 2);

    let err = queue.complete(&stale, t0() + secs(32)).await.unwrap_err();
    assert!(matches!(err, QueueError::LeaseLost { attempt: 1, .. }));
}

#[tokio::test]
async fn abandoned_final_attempt_is_exhausted() {
    let queue = MemoryQueue::new();
    let single = RetryPolicy {
        max_attempts: 1,
        base_delay: Duration::from_secs(2),
    };
    let task = TaskEnvelope::with_policy(anchor_payload(), single, t0());
    queue.enqueue(&task).await.unwrap();
    queue
        .claim(QueueName::Anchor, t0(), Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();

    let recorder = Arc::new(Recorder::default());
    let workers = pool(&queue, Flaky::new(0), 1).with_observer(recorder.clone());

    let still_leased = workers.drain_once(t0() + secs(10)).await.unwrap();
    assert_eq!(still_leased, DrainReport::default());

    let report = workers.drain_once(t0() + secs(31)).await.unwrap();
    assert_eq!(report.exhausted, 1);
    assert_eq!(report.claimed, 0);

    let stored = queue.get(task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Exhausted);
    assert_eq!(stored.last_error.as_deref(), Some(LEASE_EXPIRED_ERROR));
    assert_eq!(recorder.seen.lock().len(), 1);
}

#[tokio::test]
async fn run_loop_processes_until_shutdown() {
    let queue = MemoryQueue::new();
    let handler = Flaky::new(0);
    let workers = pool(&queue, handler.clone(), 2);
    for _ in 0..4 {
        submit(&queue, anchor_payload(), Utc::now()).await.unwrap();
    }

    let (tx, rx) = watch::channel(false);
    let running = tokio::spawn(workers.run(rx));

    for _ in 0..200 {
        if queue.count(QueueName::Anchor, TaskStatus::Completed) == 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tx.send(true).unwrap();
    running.await.unwrap();

    assert_eq!(queue.count(QueueName::Anchor, TaskStatus::Completed), 4);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn backoff_starts_when_the_failed_attempt_ends() {
    let queue = MemoryQueue::new();
    let handler = Arc::new(Slow {
        work: Duration::from_millis(200),
        spans: Mutex::new(Vec::new()),
    });
    let workers = pool(&queue, handler.clone(), 1);
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(300),
    };
    let task = TaskEnvelope::with_policy(anchor_payload(), policy, Utc::now());
    queue.enqueue(&task).await.unwrap();

    let (tx, rx) = watch::channel(false);
    let running = tokio::spawn(workers.run(rx));
    for _ in 0..300 {
        if queue.count(QueueName::Anchor, TaskStatus::Completed) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tx.send(true).unwrap();
    running.await.unwrap();

    let spans = handler.spans.lock();
    assert_eq!(spans.len(), 2);
    let (_, first_failed) = spans[0];
    let (second_started, _) = spans[1];
    let gap = second_started.duration_since(first_failed);
    assert!(gap >= Duration::from_millis(280), "retried after only {gap:?}");
}

#[tokio::test]
async fn busy_queue_still_reaps_abandoned_leases() {
    let queue = MemoryQueue::new();
    for _ in 0..100 {
        submit(&queue, anchor_payload(), Utc::now()).await.unwrap();
    }
    let recorder = Arc::new(Recorder::default());
    let workers = pool(
        &queue,
        Arc::new(Busy {
            work: Duration::from_millis(20),
        }),
        1,
    )
    .with_observer(recorder.clone());

    let (tx, rx) = watch::channel(false);
    let running = tokio::spawn(workers.run(rx));
    tokio::time::sleep(Duration::from_millis(60)).await;

    // A final attempt whose worker vanished a minute ago.
    let single = RetryPolicy {
        max_attempts: 1,
        base_delay: Duration::from_secs(2),
    };
    let past = Utc::now() - secs(60);
    let mut orphan = TaskEnvelope::with_policy(anchor_payload(), single, past);
    orphan.claim(past, Duration::from_secs(30));
    queue.enqueue(&orphan).await.unwrap();

    for _ in 0..100 {
        if !recorder.seen.lock().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let pending = queue.count(QueueName::Anchor, TaskStatus::Pending);
    tx.send(true).unwrap();
    running.await.unwrap();

    assert!(pending > 0, "queue drained before the reap was observed");
    let stored = queue.get(orphan.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Exhausted);
    assert_eq!(stored.last_error.as_deref(), Some(LEASE_EXPIRED_ERROR));
}
