//! PostgreSQL implementation of the queue's [`DurableRecordStore`]: the
//! transactional record-of-truth half of the queue, backing the
//! `jobs`/`failed_jobs` tables.
//!
//! # Database schema
//!
//! ```sql
//! CREATE TABLE jobs (
//!     id UUID PRIMARY KEY,
//!     queue VARCHAR(255) NOT NULL,
//!     handler_name VARCHAR(255) NOT NULL,
//!     payload JSONB NOT NULL,
//!     max_attempts INTEGER NOT NULL DEFAULT 1,
//!     delay BIGINT NOT NULL DEFAULT 0,
//!     status VARCHAR(255) NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! CREATE INDEX idx_jobs_queue ON jobs (queue);
//! CREATE INDEX idx_jobs_status ON jobs (status);
//!
//! CREATE TABLE failed_jobs (
//!     id SERIAL PRIMARY KEY,
//!     job_id UUID UNIQUE NOT NULL,
//!     queue VARCHAR(255) NOT NULL,
//!     payload JSONB NOT NULL,
//!     error TEXT NOT NULL,
//!     failed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! CREATE INDEX idx_failed_jobs_queue ON failed_jobs (queue);
//! ```
//!
//! Note the `jobs` table carries no `attempts` column: the attempt counter
//! lives only on the wire-format [`Job`] pushed through the fast store.
//! [`PgRecordStore::select_jobs_where_not_completed_oldest_first`]
//! therefore reconstructs every row with `attempts = 0` — crash recovery
//! always restarts a recovered job's attempt count, while keeping the
//! row's original id so the restored entry still has a matching durable
//! row once it is re-pushed.
//!
//! # Usage
//!
//! ```rust,ignore
//! use queue_postgres::PgRecordStore;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/queue").await?;
//! queue_postgres::migrate(&pool).await?;
//! let store = PgRecordStore::new(pool);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use queue_core::{DurableJobRow, DurableRecordStore, FailedJobRecord, Job, JobStatus, NewFailedJobRecord};
use serde_json::value::RawValue;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

/// Applies the crate's bundled migrations. Call once at process start,
/// before the first queue operation — matches the boilerplate's
/// `cmd/migrate.go` role, folded into library setup instead of a separate
/// command since `sqlx::migrate!` embeds the SQL at compile time.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// PostgreSQL-backed [`DurableRecordStore`].
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        PgRecordStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn job_row_to_durable(row: PgRow) -> anyhow::Result<DurableJobRow> {
    let payload_json: serde_json::Value = row.try_get("payload")?;
    let payload = RawValue::from_string(payload_json.to_string())?;
    let status: String = row.try_get("status")?;
    Ok(DurableJobRow {
        job: Job {
            id: row.try_get("id")?,
            handler_name: row.try_get("handler_name")?,
            payload,
            created_at: row.try_get("created_at")?,
            max_attempts: row.try_get("max_attempts")?,
            // Not a durable column (see module docs): every reconstructed
            // row starts back at zero attempts.
            attempts: 0,
            delay_seconds: row.try_get::<i64, _>("delay")?,
            errors: Vec::new(),
        },
        queue: row.try_get("queue")?,
        status: status.parse().map_err(|e: String| anyhow::anyhow!(e))?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn failed_row_to_record(row: PgRow) -> anyhow::Result<FailedJobRecord> {
    let payload_json: serde_json::Value = row.try_get("payload")?;
    let payload = RawValue::from_string(payload_json.to_string())?;
    Ok(FailedJobRecord {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        queue: row.try_get("queue")?,
        payload,
        error: row.try_get("error")?,
        failed_at: row.try_get("failed_at")?,
    })
}

#[async_trait]
impl DurableRecordStore for PgRecordStore {
    async fn insert_job(&self, queue: &str, job: &Job) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        let payload: serde_json::Value = serde_json::from_str(job.payload.get())?;
        sqlx::query(
            r#"
            INSERT INTO jobs (id, queue, handler_name, payload, max_attempts, delay, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            "#,
        )
        .bind(job.id)
        .bind(queue)
        .bind(&job.handler_name)
        .bind(payload)
        .bind(job.max_attempts)
        .bind(job.delay_seconds)
        .bind(JobStatus::Pending.as_str())
        .bind(job.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_status(&self, job_id: Uuid, status: JobStatus) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE jobs SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn reset_processing_to_pending(&self) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE jobs SET status = 'pending', updated_at = NOW() WHERE status = 'processing'")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        let affected = result.rows_affected();
        if affected > 0 {
            tracing::info!(affected, "reset stuck processing rows back to pending");
        }
        Ok(affected)
    }

    fn select_jobs_where_not_completed_oldest_first(&self) -> BoxStream<'_, anyhow::Result<DurableJobRow>> {
        stream::once(async move {
            sqlx::query(
                "SELECT id, queue, handler_name, payload, max_attempts, delay, status, created_at, updated_at \
                 FROM jobs WHERE status != 'completed' ORDER BY created_at ASC",
            )
            .fetch_all(&self.pool)
            .await
        })
        .flat_map(|rows| match rows {
            Ok(rows) => stream::iter(rows.into_iter().map(job_row_to_durable)).left_stream(),
            Err(err) => stream::iter(vec![Err(err.into())]).right_stream(),
        })
        .boxed()
    }

    fn select_failed_jobs(&self) -> BoxStream<'_, anyhow::Result<FailedJobRecord>> {
        stream::once(async move {
            sqlx::query("SELECT id, job_id, queue, payload, error, failed_at FROM failed_jobs ORDER BY failed_at ASC")
                .fetch_all(&self.pool)
                .await
        })
        .flat_map(|rows| match rows {
            Ok(rows) => stream::iter(rows.into_iter().map(failed_row_to_record)).left_stream(),
            Err(err) => stream::iter(vec![Err(err.into())]).right_stream(),
        })
        .boxed()
    }

    async fn insert_failed_job(&self, record: &NewFailedJobRecord) -> anyhow::Result<i64> {
        let mut tx = self.pool.begin().await?;
        let payload: serde_json::Value = serde_json::from_str(record.payload.get())?;
        let failed_at: DateTime<Utc> = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO failed_jobs (job_id, queue, payload, error, failed_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(record.job_id)
        .bind(&record.queue)
        .bind(payload)
        .bind(&record.error)
        .bind(failed_at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row.try_get("id")?)
    }

    async fn delete_failed_job(&self, job_id: Uuid) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM failed_jobs WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
