use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::engine::QueueEngine;
use crate::registry::{HandlerRegistry, RegistryError};

/// The fixed per-call dequeue timeout every worker polls with between
/// idle-streak log lines.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Fans out `worker_count` independent loops and waits for every one of
/// them to return before returning itself, so a graceful shutdown blocks
/// until every worker has actually stopped.
pub async fn run_workers(
    engine: Arc<QueueEngine>,
    registry: Arc<HandlerRegistry>,
    queue_name: &str,
    worker_count: usize,
    cancel: CancellationToken,
) {
    let mut workers = JoinSet::new();
    for worker_idx in 0..worker_count {
        let engine = engine.clone();
        let registry = registry.clone();
        let queue_name = queue_name.to_string();
        let cancel = cancel.clone();
        workers.spawn(worker_loop(worker_idx, engine, registry, queue_name, cancel));
    }
    while workers.join_next().await.is_some() {}
}

async fn worker_loop(
    worker_idx: usize,
    engine: Arc<QueueEngine>,
    registry: Arc<HandlerRegistry>,
    queue_name: String,
    cancel: CancellationToken,
) {
    let mut waiting_logged = false;
    loop {
        if cancel.is_cancelled() {
            tracing::info!(worker = worker_idx, queue = %queue_name, "worker stopped gracefully");
            return;
        }

        // The whole iteration is panic-isolated. A panic here (outside the
        // handler-invocation path, which has its own narrower isolation
        // below) is logged and the loop continues; the job, if any was
        // dequeued, is left on the attempt list for recovery to find.
        let outcome = AssertUnwindSafe(process_one_job(
            &engine,
            &registry,
            &queue_name,
            &cancel,
            &mut waiting_logged,
        ))
        .catch_unwind()
        .await;

        if let Err(panic) = outcome {
            tracing::error!(
                worker = worker_idx,
                queue = %queue_name,
                panic = %panic_message(&panic),
                "worker iteration panicked, continuing"
            );
        }
    }
}

/// One iteration: dequeue, dispatch, resolve. Returns normally on every
/// outcome (timeout, handler-missing, decode error, handler error or
/// success) — the only way out of the loop is the cancellation check at
/// the top of [`worker_loop`].
async fn process_one_job(
    engine: &Arc<QueueEngine>,
    registry: &Arc<HandlerRegistry>,
    queue_name: &str,
    cancel: &CancellationToken,
    waiting_logged: &mut bool,
) {
    let dequeued = tokio::select! {
        res = engine.dequeue(queue_name, DEQUEUE_TIMEOUT) => res,
        _ = cancel.cancelled() => return,
    };

    let job = match dequeued {
        Ok(Some(job)) => job,
        Ok(None) => {
            if !*waiting_logged {
                tracing::info!(queue = %queue_name, "waiting for {queue_name} ...");
                *waiting_logged = true;
            }
            return;
        }
        Err(err) => {
            tracing::error!(queue = %queue_name, error = %err, "error dequeueing job");
            return;
        }
    };
    *waiting_logged = false;

    tracing::info!(queue = %queue_name, job_id = %job.id, "starting job");

    let handler_error = dispatch(registry, &job.handler_name, &job.payload).await;

    tracing::info!(
        queue = %queue_name,
        job_id = %job.id,
        handler = %job.handler_name,
        error = ?handler_error,
        "finished processing job"
    );

    if let Err(err) = engine
        .remove_processed(queue_name, job.id, handler_error, cancel)
        .await
    {
        tracing::error!(queue = %queue_name, job_id = %job.id, error = %err, "error removing processed job");
    }
}

/// Looks up the handler, decodes the payload into a fresh instance,
/// invokes it. Returns the message that should be appended to the job's
/// error trail, or `None` on success.
async fn dispatch(
    registry: &Arc<HandlerRegistry>,
    handler_name: &str,
    payload: &serde_json::value::RawValue,
) -> Option<String> {
    let mut handler = match registry.construct(handler_name, payload) {
        Ok(handler) => handler,
        Err(RegistryError::NotFound) => return Some("handler not found".to_string()),
        Err(RegistryError::Decode(err)) => return Some(format!("payload decode error: {err}")),
    };

    // A panic specifically inside `handle()` is caught and converted into
    // the same "handler returned error" path, with the panic value as the
    // error string, rather than being left unresolved.
    match AssertUnwindSafe(handler.handle()).catch_unwind().await {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err.to_string()),
        Err(panic) => Some(panic_message(&panic)),
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked with a non-string payload".to_string()
    }
}
