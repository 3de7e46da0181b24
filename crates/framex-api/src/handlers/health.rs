//! Liveness and readiness probes.

use std::future::Future;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// `GET /health`, `GET /healthz`: the process is up.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeState {
    Ok,
    Error,
}

/// Result of probing one dependency.
#[derive(Debug, Serialize)]
pub struct Probe {
    pub status: ProbeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Probe {
    async fn run<T, E, Fut>(check: Fut) -> (Self, Option<T>)
    where
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let started = Instant::now();
        match check.await {
            Ok(value) => {
                let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                let probe = Probe {
                    status: ProbeState::Ok,
                    latency_ms: Some(latency_ms),
                    error: None,
                };
                (probe, Some(value))
            }
            Err(e) => {
                let probe = Probe {
                    status: ProbeState::Error,
                    latency_ms: None,
                    error: Some(e.to_string()),
                };
                (probe, None)
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub store: Probe,
    pub queue: Probe,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_length: Option<u64>,
    pub checks: ReadinessChecks,
}

/// `GET /ready`: job store and work queue are reachable. Answers 503 when
/// either probe fails.
pub async fn ready(State(state): State<AppState>) -> Response {
    let (store, _) = Probe::run(state.jobs.repository().ping()).await;
    let (queue, queue_length) = Probe::run(state.jobs.queue().len()).await;

    if let Some(len) = queue_length {
        metrics::set_queue_length(len);
    }

    let healthy = store.status == ProbeState::Ok && queue.status == ProbeState::Ok;
    let (code, status) = if healthy {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = ReadinessResponse {
        status,
        queue_length,
        checks: ReadinessChecks { store, queue },
    };
    (code, Json(body)).into_response()
}
