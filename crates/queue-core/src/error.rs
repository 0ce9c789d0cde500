use uuid::Uuid;

/// The closed, matchable error surface the core itself raises. Store
/// adapters report their own failures as `anyhow::Error` wrapped in
/// [`QueueError::StoreUnavailable`] / [`QueueError::Encode`]; everything
/// else is a `QueueError` the engine constructs directly.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("encode error: {0}")]
    Encode(#[source] anyhow::Error),

    #[error("handler not found")]
    HandlerMissing,

    #[error("payload decode error: {0}")]
    PayloadDecode(#[source] anyhow::Error),

    #[error("handler error: {0}")]
    Handler(String),

    #[error("job {job_id} already reached its maximum attempts ({max_attempts})")]
    MaxAttemptsExhausted { job_id: Uuid, max_attempts: i32 },

    #[error("not found")]
    NotFound,

    #[error("cancelled")]
    Cancelled,
}

impl QueueError {
    /// A stable string tag for logging and HTTP status mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueError::StoreUnavailable(_) => "store_unavailable",
            QueueError::Encode(_) => "encode_error",
            QueueError::HandlerMissing => "handler_missing",
            QueueError::PayloadDecode(_) => "payload_decode_error",
            QueueError::Handler(_) => "handler_error",
            QueueError::MaxAttemptsExhausted { .. } => "max_attempts_exhausted",
            QueueError::NotFound => "not_found",
            QueueError::Cancelled => "cancelled",
        }
    }

    pub fn store_unavailable(err: impl Into<anyhow::Error>) -> Self {
        QueueError::StoreUnavailable(err.into())
    }
}
