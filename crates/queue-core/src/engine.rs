use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobStatus, NewFailedJobRecord};
use crate::store::{DurableRecordStore, FastListStore, ListEnd};

/// The three fast-store keys that physically realise one logical queue.
#[derive(Debug, Clone)]
pub struct QueueKeys {
    pub pending: String,
    pub attempt: String,
    pub failed: String,
}

impl QueueKeys {
    pub fn new(app_prefix: &str, queue_name: &str) -> Self {
        let pending = format!("{app_prefix}_queue_{queue_name}");
        let attempt = format!("{pending}_attempt");
        let failed = format!("{pending}_failed");
        QueueKeys { pending, attempt, failed }
    }
}

fn encode(job: &Job) -> Result<Vec<u8>, QueueError> {
    serde_json::to_vec(job).map_err(|err| QueueError::Encode(err.into()))
}

fn decode(raw: &[u8]) -> Result<Job, QueueError> {
    serde_json::from_slice(raw).map_err(|err| QueueError::Encode(err.into()))
}

/// The queue engine, holding a handle to each store adapter plus the
/// deployment-wide key prefix. One engine instance is shared by every
/// worker and every admin command.
pub struct QueueEngine {
    list_store: Arc<dyn FastListStore>,
    record_store: Arc<dyn DurableRecordStore>,
    app_prefix: String,
}

impl QueueEngine {
    pub fn new(
        list_store: Arc<dyn FastListStore>,
        record_store: Arc<dyn DurableRecordStore>,
        app_prefix: impl Into<String>,
    ) -> Self {
        QueueEngine {
            list_store,
            record_store,
            app_prefix: app_prefix.into(),
        }
    }

    pub fn keys(&self, queue_name: &str) -> QueueKeys {
        QueueKeys::new(&self.app_prefix, queue_name)
    }

    pub fn app_prefix(&self) -> &str {
        &self.app_prefix
    }

    pub fn list_store(&self) -> &Arc<dyn FastListStore> {
        &self.list_store
    }

    pub fn record_store(&self) -> &Arc<dyn DurableRecordStore> {
        &self.record_store
    }

    /// Durable insert first, then list push; if the push fails the
    /// durable row is left `pending` for `restore_unfinished` to pick up
    /// later.
    pub async fn enqueue(&self, queue_name: &str, jobs: &[Job]) -> Result<(), QueueError> {
        let keys = self.keys(queue_name);
        for job in jobs {
            self.record_store
                .insert_job(queue_name, job)
                .await
                .map_err(QueueError::store_unavailable)?;
            let bytes = encode(job)?;
            self.list_store
                .push_left(&keys.pending, bytes)
                .await
                .map_err(QueueError::store_unavailable)?;
        }
        Ok(())
    }

    /// The crash-safety pivot of the whole design: `blocking_move`
    /// guarantees a job is never observably absent from both
    /// `pending_list` and `attempt_list` at once.
    pub async fn dequeue(&self, queue_name: &str, timeout: Duration) -> Result<Option<Job>, QueueError> {
        let keys = self.keys(queue_name);
        let moved = self
            .list_store
            .blocking_move(&keys.pending, &keys.attempt, ListEnd::Right, ListEnd::Left, timeout)
            .await
            .map_err(QueueError::store_unavailable)?;
        let Some(raw) = moved else {
            return Ok(None);
        };
        let mut job = decode(&raw)?;

        self.record_store
            .update_status(job.id, JobStatus::Processing)
            .await
            .map_err(QueueError::store_unavailable)?;

        if !job.has_attempts_remaining() {
            self.list_store
                .remove_first(&keys.attempt, &raw, 1)
                .await
                .map_err(QueueError::store_unavailable)?;
            return Err(QueueError::MaxAttemptsExhausted {
                job_id: job.id,
                max_attempts: job.max_attempts,
            });
        }

        job.attempts += 1;
        let new_bytes = encode(&job)?;
        self.list_store
            .remove_first(&keys.attempt, &raw, 1)
            .await
            .map_err(QueueError::store_unavailable)?;
        self.list_store
            .push_left(&keys.attempt, new_bytes)
            .await
            .map_err(QueueError::store_unavailable)?;

        Ok(Some(job))
    }

    /// Locates `job_id` on `attempt_list` by linear scan; used by
    /// `remove_processed`.
    async fn find_in_attempt_list(&self, keys: &QueueKeys, job_id: Uuid) -> Result<Option<(Vec<u8>, Job)>, QueueError> {
        let entries = self
            .list_store
            .range(&keys.attempt, 0, -1)
            .await
            .map_err(QueueError::store_unavailable)?;
        for raw in entries {
            if let Ok(job) = decode(&raw) {
                if job.id == job_id {
                    return Ok(Some((raw, job)));
                }
            }
        }
        Ok(None)
    }

    /// Resolves a dequeued job's outcome. `cancel` governs the retry-path
    /// sleep: if it fires mid-sleep the job has already left
    /// `attempt_list` but its durable row is still `processing`, so
    /// `restore_unfinished` will recover it on the next restart — no job
    /// is lost.
    pub async fn remove_processed(
        &self,
        queue_name: &str,
        job_id: Uuid,
        handler_error: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<(), QueueError> {
        let keys = self.keys(queue_name);
        let Some((raw, mut job)) = self.find_in_attempt_list(&keys, job_id).await? else {
            return Err(QueueError::NotFound);
        };
        self.list_store
            .remove_first(&keys.attempt, &raw, 1)
            .await
            .map_err(QueueError::store_unavailable)?;

        let Some(message) = handler_error else {
            self.record_store
                .update_status(job.id, JobStatus::Completed)
                .await
                .map_err(QueueError::store_unavailable)?;
            return Ok(());
        };

        job.errors.push(message);

        if job.has_attempts_remaining() {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(job.delay_seconds.max(0) as u64)) => {}
                _ = cancel.cancelled() => return Err(QueueError::Cancelled),
            }
            self.record_store
                .update_status(job.id, JobStatus::Pending)
                .await
                .map_err(QueueError::store_unavailable)?;
            let bytes = encode(&job)?;
            self.list_store
                .push_left(&keys.pending, bytes)
                .await
                .map_err(QueueError::store_unavailable)?;
            Ok(())
        } else {
            self.record_store
                .update_status(job.id, JobStatus::Failed)
                .await
                .map_err(QueueError::store_unavailable)?;
            let record = NewFailedJobRecord {
                job_id: job.id,
                queue: queue_name.to_string(),
                payload: job.payload.clone(),
                error: job.errors_joined(),
            };
            self.record_store
                .insert_failed_job(&record)
                .await
                .map_err(QueueError::store_unavailable)?;
            let bytes = encode(&job)?;
            self.list_store
                .push_left(&keys.failed, bytes)
                .await
                .map_err(QueueError::store_unavailable)?;
            Ok(())
        }
    }

    pub async fn length(&self, queue_name: &str) -> Result<i64, QueueError> {
        let keys = self.keys(queue_name);
        self.list_store.length(&keys.pending).await.map_err(QueueError::store_unavailable)
    }

    pub async fn is_empty(&self, queue_name: &str) -> Result<bool, QueueError> {
        Ok(self.length(queue_name).await? == 0)
    }

    pub async fn peek(&self, queue_name: &str, n: i64) -> Result<Vec<Job>, QueueError> {
        if n <= 0 {
            return Ok(Vec::new());
        }
        let keys = self.keys(queue_name);
        let items = self
            .list_store
            .range(&keys.pending, 0, n - 1)
            .await
            .map_err(QueueError::store_unavailable)?;
        items.iter().map(|raw| decode(raw)).collect()
    }

    pub async fn clear(&self, queue_name: &str) -> Result<i64, QueueError> {
        let keys = self.keys(queue_name);
        let prior = self.list_store.length(&keys.pending).await.map_err(QueueError::store_unavailable)?;
        self.list_store.delete(&keys.pending).await.map_err(QueueError::store_unavailable)?;
        Ok(prior)
    }

    pub async fn remove_job_by_id(&self, queue_name: &str, job_id: Uuid) -> Result<bool, QueueError> {
        let keys = self.keys(queue_name);
        let items = self
            .list_store
            .range(&keys.pending, 0, -1)
            .await
            .map_err(QueueError::store_unavailable)?;
        for raw in items {
            if let Ok(job) = decode(&raw) {
                if job.id == job_id {
                    self.list_store
                        .remove_first(&keys.pending, &raw, 1)
                        .await
                        .map_err(QueueError::store_unavailable)?;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    pub async fn remove_all_failed(&self, queue_name: &str) -> Result<i64, QueueError> {
        let keys = self.keys(queue_name);
        let prior = self.list_store.length(&keys.failed).await.map_err(QueueError::store_unavailable)?;
        self.list_store.delete(&keys.failed).await.map_err(QueueError::store_unavailable)?;
        Ok(prior)
    }

    pub async fn remove_failed_by_id(&self, queue_name: &str, job_id: Uuid) -> Result<(), QueueError> {
        let keys = self.keys(queue_name);
        let items = self
            .list_store
            .range(&keys.failed, 0, -1)
            .await
            .map_err(QueueError::store_unavailable)?;
        for raw in items {
            if let Ok(job) = decode(&raw) {
                if job.id == job_id {
                    self.list_store
                        .remove_first(&keys.failed, &raw, 1)
                        .await
                        .map_err(QueueError::store_unavailable)?;
                    return Ok(());
                }
            }
        }
        Err(QueueError::NotFound)
    }

    /// Retried jobs rejoin at the tail (`push_right`), behind whatever is
    /// already pending, never overtaking live traffic.
    pub async fn retry_failed_by_job_id(&self, queue_name: &str, job_id: Uuid) -> Result<(), QueueError> {
        let keys = self.keys(queue_name);
        let items = self
            .list_store
            .range(&keys.failed, 0, -1)
            .await
            .map_err(QueueError::store_unavailable)?;
        let mut found = None;
        for raw in items {
            if let Ok(job) = decode(&raw) {
                if job.id == job_id {
                    found = Some((raw, job));
                    break;
                }
            }
        }
        let Some((raw, mut job)) = found else {
            return Err(QueueError::NotFound);
        };
        self.list_store
            .remove_first(&keys.failed, &raw, 1)
            .await
            .map_err(QueueError::store_unavailable)?;

        job.attempts = 0;
        let new_bytes = encode(&job)?;
        if let Err(err) = self.list_store.push_right(&keys.pending, new_bytes).await {
            let _ = self.list_store.push_left(&keys.failed, raw).await;
            return Err(QueueError::store_unavailable(err));
        }

        self.record_store
            .update_status(job.id, JobStatus::Pending)
            .await
            .map_err(QueueError::store_unavailable)?;
        self.record_store
            .delete_failed_job(job.id)
            .await
            .map_err(QueueError::store_unavailable)?;
        Ok(())
    }

    /// Drains the failed list left-to-right, so the relative order jobs
    /// failed in is preserved once they land back on the pending tail. On
    /// a push failure mid-drain, restores the item and stops, returning
    /// the count moved so far rather than propagating the store error —
    /// treated as an abort, not a hard failure of the whole operation.
    pub async fn retry_all_failed(&self, queue_name: &str) -> Result<i64, QueueError> {
        let keys = self.keys(queue_name);
        let mut moved = 0i64;
        loop {
            let raw = match self.list_store.pop_left(&keys.failed).await.map_err(QueueError::store_unavailable)? {
                Some(raw) => raw,
                None => break,
            };
            let mut job = decode(&raw)?;
            job.attempts = 0;
            let new_bytes = encode(&job)?;
            if let Err(err) = self.list_store.push_right(&keys.pending, new_bytes).await {
                tracing::error!(queue = queue_name, job_id = %job.id, error = %err, "retry_all_failed: push to pending failed, restoring to failed list");
                let _ = self.list_store.push_left(&keys.failed, raw).await;
                break;
            }
            self.record_store
                .update_status(job.id, JobStatus::Pending)
                .await
                .map_err(QueueError::store_unavailable)?;
            self.record_store
                .delete_failed_job(job.id)
                .await
                .map_err(QueueError::store_unavailable)?;
            moved += 1;
        }
        Ok(moved)
    }
}
