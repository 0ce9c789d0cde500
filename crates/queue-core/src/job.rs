use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use uuid::Uuid;

/// The unit of work. This is also the wire format pushed onto the fast
/// store's lists: field names are part of the external contract and must
/// not be renamed casually (`handlerName` is camelCase on purpose, the
/// rest are snake_case, matching the original boilerplate's JSON tags).
///
/// `payload` is kept as a [`RawValue`] so the queue never parses or
/// rewrites it: it is copied byte-for-byte from the caller through to the
/// handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(rename = "handlerName")]
    pub handler_name: String,
    pub payload: Box<RawValue>,
    pub created_at: DateTime<Utc>,
    pub max_attempts: i32,
    pub attempts: i32,
    #[serde(rename = "delay")]
    pub delay_seconds: i64,
    pub errors: Vec<String>,
}

impl Job {
    /// Allocates a fresh id, stamps `created_at`, starts at zero attempts
    /// with an empty error trail. `payload` is taken pre-encoded: callers
    /// that have a `serde::Serialize` value should go through
    /// [`Job::with_serialized_payload`] instead.
    pub fn new(handler_name: impl Into<String>, payload: Box<RawValue>, max_attempts: i32, delay_seconds: i64) -> Self {
        Job {
            id: Uuid::new_v4(),
            handler_name: handler_name.into(),
            payload,
            created_at: Utc::now(),
            max_attempts,
            attempts: 0,
            delay_seconds,
            errors: Vec::new(),
        }
    }

    /// Convenience constructor for callers with a typed payload, encoding
    /// it to JSON once at construction time.
    pub fn with_serialized_payload<T: Serialize>(
        handler_name: impl Into<String>,
        payload: &T,
        max_attempts: i32,
        delay_seconds: i64,
    ) -> Result<Self, serde_json::Error> {
        let encoded = serde_json::to_string(payload)?;
        let raw = RawValue::from_string(encoded)?;
        Ok(Self::new(handler_name, raw, max_attempts, delay_seconds))
    }

    /// `attempts < max_attempts`, or unlimited if `max_attempts == 0`.
    pub fn has_attempts_remaining(&self) -> bool {
        self.max_attempts == 0 || self.attempts < self.max_attempts
    }

    pub fn errors_joined(&self) -> String {
        self.errors.join(", ")
    }
}

/// `status` lives in the durable store, not on the wire-format [`Job`]
/// itself; it is the column that drives the pending/processing/completed/
/// failed state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A full durable-store row: the wire [`Job`] plus the columns that only
/// the durable store tracks (`queue`, `status`, `updated_at`).
#[derive(Debug, Clone)]
pub struct DurableJobRow {
    pub job: Job,
    pub queue: String,
    pub status: JobStatus,
    pub updated_at: DateTime<Utc>,
}

/// Dead-letter entry written when a job exhausts its attempts.
#[derive(Debug, Clone)]
pub struct FailedJobRecord {
    pub id: i64,
    pub job_id: Uuid,
    pub queue: String,
    pub payload: Box<RawValue>,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// What `insert_failed_job` writes; `id`/`failed_at` are assigned by the
/// store.
#[derive(Debug, Clone)]
pub struct NewFailedJobRecord {
    pub job_id: Uuid,
    pub queue: String,
    pub payload: Box<RawValue>,
    pub error: String,
}
