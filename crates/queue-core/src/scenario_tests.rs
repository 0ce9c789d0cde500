//! End-to-end scenario tests and the universal invariants, driven against
//! the in-memory fakes from `queue-testing` rather than a live
//! Redis/Postgres.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use queue_testing::{InMemoryListStore, InMemoryRecordStore};
use serde::Deserialize;
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;

use crate::engine::QueueEngine;
use crate::error::QueueError;
use crate::job::{Job, JobStatus};
use crate::recovery::RecoveryOps;
use crate::registry::{HandlerRegistry, JobHandler};
use crate::worker::run_workers;

#[derive(Deserialize)]
struct Echo {
    data: String,
}

#[async_trait]
impl JobHandler for Echo {
    async fn handle(&mut self) -> anyhow::Result<()> {
        if self.data.is_empty() {
            anyhow::bail!("empty data");
        }
        Ok(())
    }
}

fn raw(json: &str) -> Box<RawValue> {
    RawValue::from_string(json.to_string()).unwrap()
}

/// Builds an engine plus a direct handle to its (concrete) record store,
/// since `QueueEngine::record_store()` only exposes the trait object and
/// assertions here need the fake's test-only introspection methods.
fn test_engine() -> (QueueEngine, Arc<InMemoryRecordStore>) {
    let records = Arc::new(InMemoryRecordStore::new());
    let engine = QueueEngine::new(Arc::new(InMemoryListStore::new()), records.clone(), "app");
    (engine, records)
}

async fn run_to_cancellation(engine: Arc<QueueEngine>, registry: Arc<HandlerRegistry>, queue: &str) {
    let cancel = CancellationToken::new();
    let handle = {
        let engine = engine.clone();
        let registry = registry.clone();
        let cancel = cancel.clone();
        let queue = queue.to_string();
        tokio::spawn(async move { run_workers(engine, registry, &queue, 1, cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    handle.await.unwrap();
}

/// One job, one worker: expect completion within 2s.
#[tokio::test]
async fn happy_path_completes() {
    let (engine, records) = test_engine();
    let engine = Arc::new(engine);
    let mut registry = HandlerRegistry::new();
    registry.register::<Echo>("Echo");
    let registry = Arc::new(registry);

    let job = Job::new("Echo", raw(r#"{"data":"hi"}"#), 3, 5);
    let job_id = job.id;
    engine.enqueue("default", &[job]).await.unwrap();

    run_to_cancellation(engine.clone(), registry, "default").await;

    assert_eq!(engine.length("default").await.unwrap(), 0);
    assert!(engine.peek("default", 10).await.unwrap().is_empty());
    assert_eq!(records.row(job_id).await.unwrap().status, JobStatus::Completed);
}

/// Fails attempt 1, succeeds attempt 2.
#[tokio::test]
async fn retry_then_succeed() {
    let (engine, _records) = test_engine();
    let cancel = CancellationToken::new();

    let job = Job::new("Flaky", raw("{}"), 3, 0);
    let job_id = job.id;
    engine.enqueue("q", &[job]).await.unwrap();

    let dequeued = engine.dequeue("q", Duration::from_millis(50)).await.unwrap().unwrap();
    assert_eq!(dequeued.attempts, 1);

    engine.remove_processed("q", job_id, Some("still flaky".to_string()), &cancel).await.unwrap();
    let pending = engine.peek("q", 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].errors.len(), 1);

    let dequeued = engine.dequeue("q", Duration::from_millis(50)).await.unwrap().unwrap();
    assert_eq!(dequeued.attempts, 2);

    engine.remove_processed("q", job_id, None, &cancel).await.unwrap();
    assert_eq!(engine.length("q").await.unwrap(), 0);
}

/// Handler always fails, max_attempts=2: job lands on the dead-letter
/// list once attempts are exhausted.
#[tokio::test]
async fn exhausted_attempts_go_to_dead_letter() {
    let (engine, records) = test_engine();
    let cancel = CancellationToken::new();

    let job = Job::new("AlwaysFails", raw("{}"), 2, 0);
    let job_id = job.id;
    engine.enqueue("q", &[job]).await.unwrap();

    for _ in 0..2 {
        let dequeued = engine.dequeue("q", Duration::from_millis(50)).await.unwrap().unwrap();
        engine.remove_processed("q", dequeued.id, Some("boom".to_string()), &cancel).await.unwrap();
    }

    let failed = records.failed_rows().await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].job_id, job_id);
    assert_eq!(failed[0].error, "boom, boom");
    assert_eq!(engine.length("q").await.unwrap(), 0);
}

/// A dead-letter job retried by id comes back to pending with attempts
/// reset to zero.
#[tokio::test]
async fn retry_failed_by_id_resets_attempts() {
    let (engine, records) = test_engine();
    let cancel = CancellationToken::new();

    let job = Job::new("AlwaysFails", raw("{}"), 1, 0);
    let job_id = job.id;
    engine.enqueue("q", &[job]).await.unwrap();
    let dequeued = engine.dequeue("q", Duration::from_millis(50)).await.unwrap().unwrap();
    engine.remove_processed("q", dequeued.id, Some("boom".to_string()), &cancel).await.unwrap();

    engine.retry_failed_by_job_id("q", job_id).await.unwrap();

    assert!(records.failed_rows().await.is_empty());
    let pending = engine.peek("q", 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 0);
}

/// A dequeued job's handler is never registered, so it goes straight to
/// dead-letter with a "handler not found" error.
#[tokio::test]
async fn unknown_handler_goes_to_dead_letter() {
    let (engine, records) = test_engine();
    let engine = Arc::new(engine);
    let registry = Arc::new(HandlerRegistry::new());

    let job = Job::new("NoSuchHandler", raw("{}"), 1, 0);
    engine.enqueue("q", &[job]).await.unwrap();

    run_to_cancellation(engine.clone(), registry, "q").await;

    let failed = records.failed_rows().await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error, "handler not found");
}

/// A job on `attempt_list` (simulated crash) is recovered by
/// `restore_unfinished` and re-processed to completion.
#[tokio::test]
async fn restart_mid_flight_recovers_and_completes() {
    let (engine, records) = test_engine();
    let engine = Arc::new(engine);

    let job = Job::new("Echo", raw(r#"{"data":"hi"}"#), 3, 0);
    let job_id = job.id;
    engine.enqueue("q", &[job]).await.unwrap();
    engine.dequeue("q", Duration::from_millis(50)).await.unwrap();

    // Crash: the job is now stuck on attempt_list with status=processing,
    // and no worker will ever resolve it. restore_unfinished recovers it.
    let recovery = RecoveryOps::new(engine.clone());
    let restored = recovery.restore_unfinished("q").await.unwrap();
    assert_eq!(restored, 1);
    assert_eq!(records.row(job_id).await.unwrap().status, JobStatus::Pending);
    assert_eq!(engine.peek("q", 10).await.unwrap().len(), 1);

    let mut registry = HandlerRegistry::new();
    registry.register::<Echo>("Echo");
    let registry = Arc::new(registry);
    run_to_cancellation(engine.clone(), registry, "q").await;

    assert_eq!(records.row(job_id).await.unwrap().status, JobStatus::Completed);
}

/// retry_all_failed on an empty failed list is a no-op.
#[tokio::test]
async fn retry_all_failed_on_empty_is_noop() {
    let (engine, _records) = test_engine();
    let moved = engine.retry_all_failed("q").await.unwrap();
    assert_eq!(moved, 0);
}

/// Once completed, resolving the same id again reports not_found rather
/// than silently re-resolving it.
#[tokio::test]
async fn completed_job_is_terminal() {
    let (engine, _records) = test_engine();
    let cancel = CancellationToken::new();
    let job = Job::new("Echo", raw(r#"{"data":"hi"}"#), 1, 0);
    let job_id = job.id;
    engine.enqueue("q", &[job]).await.unwrap();
    engine.dequeue("q", Duration::from_millis(50)).await.unwrap();
    engine.remove_processed("q", job_id, None, &cancel).await.unwrap();

    let err = engine.remove_processed("q", job_id, None, &cancel).await.unwrap_err();
    assert!(matches!(err, QueueError::NotFound));
}
