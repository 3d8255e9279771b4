//! # Operational HTTP Probes
//!
//! The only HTTP surface of the process:
//!
//! - `GET /health/liveness`: `ok` while the process runs.
//! - `GET /health/readiness`: 200 when the job store and the task queue
//!   both answer, 503 otherwise. The JSON body names each check.
//! - `GET /metrics`: Prometheus text exposition.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tw_queue::TaskQueue;
use tw_store::JobStore;

/// Shared state of the probe router.
#[derive(Clone)]
pub struct ProbeState {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub metrics: PrometheusHandle,
}

impl std::fmt::Debug for ProbeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeState").finish_non_exhaustive()
    }
}

/// Readiness response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

/// Per-dependency readiness results: `ok` or the failure message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessChecks {
    pub store: String,
    pub queue: String,
}

/// Build the probe router.
pub fn router(state: ProbeState) -> Router {
    Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn liveness() -> &'static str {
    "ok"
}

async fn readiness(State(state): State<ProbeState>) -> Response {
    let (store, queue) = tokio::join!(state.store.ping(), state.queue.ping());
    let ready = store.is_ok() && queue.is_ok();

    let check = |name: &str, result: Result<(), String>| match result {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(check = name, error = %e, "readiness check failed");
            e
        }
    };
    let body = Readiness {
        status: if ready { "ready" } else { "unavailable" },
        checks: ReadinessChecks {
            store: check("store", store.map_err(|e| e.to_string())),
            queue: check("queue", queue.map_err(|e| e.to_string())),
        },
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

async fn prometheus_metrics(State(state): State<ProbeState>) -> Response {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.render(),
    )
        .into_response()
}
