//! Router assembly.

use std::sync::Arc;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{cancel_job, get_job_status, health, list_jobs, ready, submit_job};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    ClientRateLimiter,
};
use crate::state::AppState;

/// Job endpoints, rate limited per client IP.
fn job_routes(rps: u32) -> Router<AppState> {
    let limiter = Arc::new(ClientRateLimiter::new(rps));

    Router::new()
        .route("/process", post(submit_job))
        .route("/process/:id", delete(cancel_job))
        .route("/process/:id/status", get(get_job_status))
        .route("/jobs", get(list_jobs))
        .route_layer(from_fn_with_state(limiter, rate_limit_middleware))
}

/// Probes and, when a recorder is installed, `/metrics`. Never rate limited.
fn probe_routes(metrics_handle: Option<PrometheusHandle>) -> Router<AppState> {
    let probes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    match metrics_handle {
        Some(handle) => probes.route("/metrics", get(move || async move { handle.render() })),
        None => probes,
    }
}

/// Build the full application router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let body_limit = state.config.max_body_size;
    let cors = cors_layer(&state.config.cors_origins);

    job_routes(state.config.rate_limit_rps)
        .merge(probe_routes(metrics_handle))
        // Outermost last: cors sees the request first.
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(security_headers))
        .layer(from_fn(request_logging))
        .layer(from_fn(request_id))
        .layer(cors)
        .with_state(state)
}
