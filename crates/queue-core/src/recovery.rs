use std::sync::Arc;

use futures::StreamExt;
use uuid::Uuid;

use crate::engine::QueueEngine;
use crate::error::QueueError;
use crate::job::JobStatus;

/// A queue key paired with the current length of its pending list, as
/// returned by `list_queue_keys_and_lengths` and exposed over the
/// queue-inspection HTTP endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueInfo {
    pub key: String,
    pub length: i64,
}

fn encode(job: &crate::job::Job) -> Result<Vec<u8>, QueueError> {
    serde_json::to_vec(job).map_err(|err| QueueError::Encode(err.into()))
}

/// Cross-queue key enumeration, bulk clear/flush, forget-by-id scanning
/// all queues, and crash recovery. Holds the same engine every worker and
/// admin command shares.
pub struct RecoveryOps {
    engine: Arc<QueueEngine>,
}

impl RecoveryOps {
    pub fn new(engine: Arc<QueueEngine>) -> Self {
        RecoveryOps { engine }
    }

    async fn scan_all(&self, pattern: &str) -> Result<Vec<String>, QueueError> {
        let mut cursor = 0u64;
        let mut keys = Vec::new();
        loop {
            let (next_cursor, batch) = self
                .engine
                .list_store()
                .scan(cursor, pattern, 50)
                .await
                .map_err(QueueError::store_unavailable)?;
            keys.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(keys)
    }

    fn queue_prefix(&self) -> String {
        format!("{}_queue_", self.engine.app_prefix())
    }

    /// `list_queue_keys`: pending-list keys, stripped of `app_prefix`,
    /// excluding `_attempt`/`_failed` keys.
    pub async fn list_queue_keys(&self) -> Result<Vec<String>, QueueError> {
        let prefix = self.queue_prefix();
        let keys = self.scan_all(&format!("{prefix}*")).await?;
        Ok(keys
            .into_iter()
            .filter(|key| !key.ends_with("_attempt") && !key.ends_with("_failed"))
            .map(|key| key.strip_prefix(&prefix).unwrap_or(&key).to_string())
            .collect())
    }

    /// `list_queue_keys_and_lengths`.
    pub async fn list_queue_keys_and_lengths(&self) -> Result<Vec<QueueInfo>, QueueError> {
        let names = self.list_queue_keys().await?;
        let mut infos = Vec::with_capacity(names.len());
        for name in names {
            let length = self.engine.length(&name).await?;
            infos.push(QueueInfo { key: name, length });
        }
        Ok(infos)
    }

    /// `list_failed_queue_keys`: the `_failed`-suffixed subset, returned as
    /// the raw (unprefixed-stripped) fast-store keys, matching the shape
    /// `flush_all_failed` needs to delete them directly.
    pub async fn list_failed_queue_keys(&self) -> Result<Vec<String>, QueueError> {
        let prefix = self.queue_prefix();
        let keys = self.scan_all(&format!("{prefix}*")).await?;
        Ok(keys.into_iter().filter(|key| key.ends_with("_failed")).collect())
    }

    /// `clear_all`: delete every queue's pending list, returning the total
    /// number of entries cleared.
    pub async fn clear_all(&self) -> Result<i64, QueueError> {
        let names = self.list_queue_keys().await?;
        let mut total = 0i64;
        for name in names {
            total += self.engine.clear(&name).await?;
        }
        Ok(total)
    }

    /// `flush_all_failed`: delete every queue's failed list, returning the
    /// total number of entries cleared.
    pub async fn flush_all_failed(&self) -> Result<i64, QueueError> {
        let keys = self.list_failed_queue_keys().await?;
        let mut total = 0i64;
        for key in keys {
            total += self
                .engine
                .list_store()
                .delete(&key)
                .await
                .map_err(QueueError::store_unavailable)?;
        }
        Ok(total)
    }

    /// `remove_job_on_any_queue_by_id`: try every queue's pending list in
    /// turn, returning the first queue that claimed a deletion.
    pub async fn remove_job_on_any_queue_by_id(&self, job_id: Uuid) -> Result<String, QueueError> {
        for name in self.list_queue_keys().await? {
            if self.engine.remove_job_by_id(&name, job_id).await? {
                return Ok(name);
            }
        }
        Err(QueueError::NotFound)
    }

    /// `restore_unfinished(queue_name)`: crash recovery. Selects every
    /// durable job not yet `completed` (oldest first), flips any row stuck
    /// at `processing` back to `pending`, then re-pushes each selected
    /// record onto `queue_name`'s pending or failed list depending on its
    /// status. Matches the boilerplate this was ported from: the selection
    /// is not filtered by the record's own `queue` column, so restoring
    /// queue A will also re-home any unfinished jobs that happen to belong
    /// to other queues (see DESIGN.md's Open Question notes).
    ///
    /// Idempotent only when the fast store is empty going in: run it once
    /// against a freshly started, empty list store.
    pub async fn restore_unfinished(&self, queue_name: &str) -> Result<usize, QueueError> {
        let rows = {
            let mut stream = self.engine.record_store().select_jobs_where_not_completed_oldest_first();
            let mut collected = Vec::new();
            while let Some(row) = stream.next().await {
                collected.push(row.map_err(QueueError::store_unavailable)?);
            }
            collected
        };

        self.engine
            .record_store()
            .reset_processing_to_pending()
            .await
            .map_err(QueueError::store_unavailable)?;

        let keys = self.engine.keys(queue_name);
        let mut restored = 0usize;
        for row in rows {
            match row.status {
                JobStatus::Completed => continue,
                JobStatus::Failed => {
                    let bytes = encode(&row.job)?;
                    self.engine
                        .list_store()
                        .push_left(&keys.failed, bytes)
                        .await
                        .map_err(QueueError::store_unavailable)?;
                }
                JobStatus::Pending | JobStatus::Processing => {
                    let bytes = encode(&row.job)?;
                    self.engine
                        .list_store()
                        .push_left(&keys.pending, bytes)
                        .await
                        .map_err(QueueError::store_unavailable)?;
                }
            }
            restored += 1;
        }
        Ok(restored)
    }
}
