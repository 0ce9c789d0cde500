//! A liveness check and a read-only queue-inspection endpoint, built on
//! `axum` + `tower-http` tracing the same way the wider pack's Rust
//! services expose their REST surfaces.
//!
//! `GET /healthz` returns an unconditional 200 — it does not probe Redis
//! or Postgres, matching the original boilerplate's healthz handler.
//! `GET /v1/queues` lists every queue key with its pending length, backed
//! by [`queue_core::RecoveryOps::list_queue_keys_and_lengths`].

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use queue_core::RecoveryOps;
use serde::Serialize;
use tower_http::trace::TraceLayer;

/// Shared state behind every route: just the cross-queue recovery/admin
/// surface, which is all `/v1/queues` needs.
#[derive(Clone)]
pub struct AppState {
    pub recovery: Arc<RecoveryOps>,
}

/// The boilerplate's `CommonResponse` envelope: `response_code` 0 means
/// success, `data` carries the payload.
#[derive(Serialize)]
struct CommonResponse<T> {
    response_code: i32,
    response_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T> CommonResponse<T> {
    fn ok(data: T) -> Self {
        CommonResponse {
            response_code: 0,
            response_message: "OK".to_string(),
            data: Some(data),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/queues", get(get_queues))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> impl IntoResponse {
    Json(CommonResponse::ok(serde_json::json!({})))
}

async fn get_queues(State(state): State<AppState>) -> impl IntoResponse {
    match state.recovery.list_queue_keys_and_lengths().await {
        Ok(queues) => Json(CommonResponse::ok(queues)).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "GET /v1/queues failed");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(CommonResponse::<()> {
                    response_code: 800,
                    response_message: err.to_string(),
                    data: None,
                }),
            )
                .into_response()
        }
    }
}

/// Binds `addr` and serves the admin router until the process is killed;
/// the CLI wires this in behind its own cancellation handling rather than
/// driving it synchronously with the worker pool.
pub async fn serve(addr: std::net::SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "admin HTTP surface listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use queue_core::QueueEngine;
    use queue_testing::{InMemoryListStore, InMemoryRecordStore};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let engine = Arc::new(QueueEngine::new(
            Arc::new(InMemoryListStore::new()),
            Arc::new(InMemoryRecordStore::new()),
            "app",
        ));
        AppState {
            recovery: Arc::new(RecoveryOps::new(engine)),
        }
    }

    #[tokio::test]
    async fn healthz_returns_200() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn get_queues_returns_empty_list_when_no_queues_exist() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/v1/queues").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
