use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::job::{DurableJobRow, FailedJobRecord, JobStatus, NewFailedJobRecord};

/// Which end of a list an operation targets. `FastListStore` is modelled
/// on a Redis-shaped list primitive (LPUSH/RPUSH/LPOP/RPOP/BLMOVE) but is
/// deliberately store-agnostic so `queue-testing` can fake it in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEnd {
    Left,
    Right,
}

/// A page of a `scan` cursor walk: the cursor to resume from (`0` means
/// the walk completed) and the batch of matched keys.
pub type ScanPage = (u64, Vec<String>);

/// The fast, low-latency list store. All operations are keyed by an
/// opaque string; the queue engine owns the key layout.
#[async_trait]
pub trait FastListStore: Send + Sync {
    async fn push_left(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()>;
    async fn push_right(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()>;

    /// Non-blocking pop; `Ok(None)` when the list is empty.
    async fn pop_left(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn pop_right(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Atomically pop one value from `src` and push it onto `dst`,
    /// blocking up to `timeout` for data to appear on `src`. A value is
    /// never observably absent from both lists at once.
    async fn blocking_move(
        &self,
        src: &str,
        dst: &str,
        from_end: ListEnd,
        to_end: ListEnd,
        timeout: Duration,
    ) -> anyhow::Result<Option<Vec<u8>>>;

    /// Remove the first `count` occurrences of `value` from `key`,
    /// returning the number actually removed.
    async fn remove_first(&self, key: &str, value: &[u8], count: i64) -> anyhow::Result<i64>;

    /// `start`/`stop` are inclusive, zero-based, and may be negative to
    /// index from the tail (Redis `LRANGE` semantics).
    async fn range(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<Vec<u8>>>;

    async fn length(&self, key: &str) -> anyhow::Result<i64>;

    /// Delete `key` entirely, returning the number of entries it held.
    async fn delete(&self, key: &str) -> anyhow::Result<i64>;

    /// Iterate keys matching `pattern` (a store-native glob), resumable
    /// via `cursor` (start at `0`); the walk is complete once the
    /// returned cursor is `0` again. `batch_hint` is advisory.
    async fn scan(&self, cursor: u64, pattern: &str, batch_hint: usize) -> anyhow::Result<ScanPage>;
}

/// The durable, transactional record store: the two tables `jobs` and
/// `failed_jobs`. Every mutating call commits-or-rolls-back as a single
/// transaction; the two streaming selects must not buffer the full
/// result set in memory.
#[async_trait]
pub trait DurableRecordStore: Send + Sync {
    async fn insert_job(&self, queue: &str, job: &crate::job::Job) -> anyhow::Result<()>;

    async fn update_status(&self, job_id: Uuid, status: JobStatus) -> anyhow::Result<()>;

    /// Flips any row stuck at `processing` back to `pending` (used by
    /// crash recovery). Returns the number of rows affected.
    async fn reset_processing_to_pending(&self) -> anyhow::Result<u64>;

    /// Rows with `status != completed`, oldest `created_at` first.
    /// Streamed: callers must not assume the whole set is materialised.
    fn select_jobs_where_not_completed_oldest_first(&self) -> BoxStream<'_, anyhow::Result<DurableJobRow>>;

    fn select_failed_jobs(&self) -> BoxStream<'_, anyhow::Result<FailedJobRecord>>;

    async fn insert_failed_job(&self, record: &NewFailedJobRecord) -> anyhow::Result<i64>;

    async fn delete_failed_job(&self, job_id: Uuid) -> anyhow::Result<()>;
}
