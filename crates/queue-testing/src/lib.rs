//! In-memory fakes of [`FastListStore`] and [`DurableRecordStore`], used to
//! exercise `queue-core`'s engine, worker pool, and recovery pass without a
//! live Redis or Postgres. Mirrors the `seesaw-testing` crate pattern: a
//! small, dependency-light double kept in its own crate so both `queue-core`
//! and downstream crates can depend on it under `[dev-dependencies]`.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use queue_core::{DurableJobRow, DurableRecordStore, FastListStore, FailedJobRecord, Job, JobStatus, ListEnd, NewFailedJobRecord, ScanPage};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

/// An in-memory stand-in for a Redis-shaped list store. `blocking_move`
/// actually blocks (via [`Notify`]) rather than busy-polling, so tests that
/// race a dequeue against a delayed enqueue behave the same as they would
/// against a real store.
#[derive(Default)]
pub struct InMemoryListStore {
    lists: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    notify: Notify,
}

impl InMemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_end(entries: &mut VecDeque<Vec<u8>>, end: ListEnd, value: Vec<u8>) {
        match end {
            ListEnd::Left => entries.push_front(value),
            ListEnd::Right => entries.push_back(value),
        }
    }

    fn pop_end(entries: &mut VecDeque<Vec<u8>>, end: ListEnd) -> Option<Vec<u8>> {
        match end {
            ListEnd::Left => entries.pop_front(),
            ListEnd::Right => entries.pop_back(),
        }
    }
}

#[async_trait]
impl FastListStore for InMemoryListStore {
    async fn push_left(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        let mut lists = self.lists.lock().await;
        lists.entry(key.to_string()).or_default().push_front(value);
        drop(lists);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn push_right(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        let mut lists = self.lists.lock().await;
        lists.entry(key.to_string()).or_default().push_back(value);
        drop(lists);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn pop_left(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut lists = self.lists.lock().await;
        Ok(lists.get_mut(key).and_then(|entries| entries.pop_front()))
    }

    async fn pop_right(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut lists = self.lists.lock().await;
        Ok(lists.get_mut(key).and_then(|entries| entries.pop_back()))
    }

    async fn blocking_move(
        &self,
        src: &str,
        dst: &str,
        from_end: ListEnd,
        to_end: ListEnd,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut lists = self.lists.lock().await;
                let popped = lists.get_mut(src).and_then(|entries| Self::pop_end(entries, from_end));
                if let Some(value) = popped {
                    let dst_entries = lists.entry(dst.to_string()).or_default();
                    Self::push_end(dst_entries, to_end, value.clone());
                    drop(lists);
                    self.notify.notify_waiters();
                    return Ok(Some(value));
                }
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(deadline - now) => return Ok(None),
            }
        }
    }

    async fn remove_first(&self, key: &str, value: &[u8], count: i64) -> anyhow::Result<i64> {
        let mut lists = self.lists.lock().await;
        let Some(entries) = lists.get_mut(key) else {
            return Ok(0);
        };
        let mut removed = 0i64;
        let mut kept = VecDeque::with_capacity(entries.len());
        for entry in entries.drain(..) {
            if removed < count && entry == value {
                removed += 1;
            } else {
                kept.push_back(entry);
            }
        }
        *entries = kept;
        Ok(removed)
    }

    async fn range(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<Vec<u8>>> {
        let lists = self.lists.lock().await;
        let Some(entries) = lists.get(key) else {
            return Ok(Vec::new());
        };
        let len = entries.len() as i64;
        if len == 0 {
            return Ok(Vec::new());
        }
        let normalize = |idx: i64| -> i64 { if idx < 0 { (len + idx).max(0) } else { idx.min(len - 1) } };
        let start = normalize(start);
        let stop = normalize(stop);
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(entries.iter().skip(start as usize).take((stop - start + 1) as usize).cloned().collect())
    }

    async fn length(&self, key: &str) -> anyhow::Result<i64> {
        let lists = self.lists.lock().await;
        Ok(lists.get(key).map(|entries| entries.len() as i64).unwrap_or(0))
    }

    async fn delete(&self, key: &str) -> anyhow::Result<i64> {
        let mut lists = self.lists.lock().await;
        Ok(lists.remove(key).map(|entries| entries.len() as i64).unwrap_or(0))
    }

    async fn scan(&self, _cursor: u64, pattern: &str, _batch_hint: usize) -> anyhow::Result<ScanPage> {
        let lists = self.lists.lock().await;
        let matched: Vec<String> = lists.keys().filter(|key| glob_match(pattern, key)).cloned().collect();
        Ok((0, matched))
    }
}

/// `pattern` may contain `*` wildcards (the only glob syntax `scan` callers
/// in this crate ever pass); matches the whole key.
fn glob_match(pattern: &str, key: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == key;
    }
    let mut rest = key;
    for (idx, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if idx == 0 {
            if !rest.starts_with(segment) {
                return false;
            }
            rest = &rest[segment.len()..];
        } else if idx == segments.len() - 1 {
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
    }
    true
}

#[derive(Default)]
struct RecordState {
    jobs: HashMap<Uuid, DurableJobRow>,
    failed: Vec<FailedJobRecord>,
    next_failed_id: i64,
}

/// An in-memory stand-in for the transactional durable record store.
/// Not actually transactional (no rollback path exists here because
/// nothing in this fake can fail mid-operation), but preserves the same
/// externally observable sequencing.
pub struct InMemoryRecordStore {
    state: Mutex<RecordState>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        InMemoryRecordStore {
            state: Mutex::new(RecordState {
                jobs: HashMap::new(),
                failed: Vec::new(),
                next_failed_id: 1,
            }),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordStore {
    /// Test-only introspection: the durable row for `job_id`, if any.
    pub async fn row(&self, job_id: Uuid) -> Option<DurableJobRow> {
        self.state.lock().await.jobs.get(&job_id).cloned()
    }

    /// Test-only introspection: every dead-letter row currently recorded.
    pub async fn failed_rows(&self) -> Vec<FailedJobRecord> {
        self.state.lock().await.failed.clone()
    }
}

#[async_trait]
impl DurableRecordStore for InMemoryRecordStore {
    async fn insert_job(&self, queue: &str, job: &Job) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.jobs.insert(
            job.id,
            DurableJobRow {
                job: job.clone(),
                queue: queue.to_string(),
                status: JobStatus::Pending,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn update_status(&self, job_id: Uuid, status: JobStatus) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if let Some(row) = state.jobs.get_mut(&job_id) {
            row.status = status;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reset_processing_to_pending(&self) -> anyhow::Result<u64> {
        let mut state = self.state.lock().await;
        let mut affected = 0u64;
        for row in state.jobs.values_mut() {
            if row.status == JobStatus::Processing {
                row.status = JobStatus::Pending;
                row.updated_at = Utc::now();
                affected += 1;
            }
        }
        Ok(affected)
    }

    fn select_jobs_where_not_completed_oldest_first(&self) -> BoxStream<'_, anyhow::Result<DurableJobRow>> {
        stream::once(async move {
            let state = self.state.lock().await;
            let mut rows: Vec<DurableJobRow> = state.jobs.values().filter(|row| row.status != JobStatus::Completed).cloned().collect();
            rows.sort_by_key(|row| row.job.created_at);
            rows
        })
        .flat_map(|rows| stream::iter(rows.into_iter().map(Ok)))
        .boxed()
    }

    fn select_failed_jobs(&self) -> BoxStream<'_, anyhow::Result<FailedJobRecord>> {
        stream::once(async move {
            let state = self.state.lock().await;
            let mut rows = state.failed.clone();
            rows.sort_by_key(|row| row.failed_at);
            rows
        })
        .flat_map(|rows| stream::iter(rows.into_iter().map(Ok)))
        .boxed()
    }

    async fn insert_failed_job(&self, record: &NewFailedJobRecord) -> anyhow::Result<i64> {
        let mut state = self.state.lock().await;
        let id = state.next_failed_id;
        state.next_failed_id += 1;
        state.failed.push(FailedJobRecord {
            id,
            job_id: record.job_id,
            queue: record.queue.clone(),
            payload: record.payload.clone(),
            error: record.error.clone(),
            failed_at: Utc::now(),
        });
        Ok(id)
    }

    async fn delete_failed_job(&self, job_id: Uuid) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.failed.retain(|record| record.job_id != job_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn push_left_pop_right_is_fifo() {
        let store = InMemoryListStore::new();
        store.push_left("q", b"a".to_vec()).await.unwrap();
        store.push_left("q", b"b".to_vec()).await.unwrap();
        assert_eq!(store.pop_right("q").await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(store.pop_right("q").await.unwrap(), Some(b"b".to_vec()));
        assert_eq!(store.pop_right("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn blocking_move_times_out_on_empty_source() {
        let store = InMemoryListStore::new();
        let moved = store
            .blocking_move("src", "dst", ListEnd::Right, ListEnd::Left, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(moved.is_none());
    }

    #[tokio::test]
    async fn blocking_move_wakes_on_push() {
        let store = std::sync::Arc::new(InMemoryListStore::new());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .blocking_move("src", "dst", ListEnd::Right, ListEnd::Left, Duration::from_secs(2))
                    .await
                    .unwrap()
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.push_right("src", b"job".to_vec()).await.unwrap();
        let moved = waiter.await.unwrap();
        assert_eq!(moved, Some(b"job".to_vec()));
        assert_eq!(store.range("dst", 0, -1).await.unwrap(), vec![b"job".to_vec()]);
    }

    #[tokio::test]
    async fn reset_processing_to_pending_counts_affected_rows() {
        let store = InMemoryRecordStore::new();
        let job = Job::new("Echo", serde_json::value::RawValue::from_string("{}".into()).unwrap(), 1, 0);
        store.insert_job("default", &job).await.unwrap();
        store.update_status(job.id, JobStatus::Processing).await.unwrap();
        let affected = store.reset_processing_to_pending().await.unwrap();
        assert_eq!(affected, 1);
    }
}
