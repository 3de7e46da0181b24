//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Install the global recorder; the handle renders `/metrics`.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "framex_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "framex_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "framex_http_requests_in_flight";

    pub const JOBS_SUBMITTED_TOTAL: &str = "framex_jobs_submitted_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "framex_jobs_cancelled_total";
    pub const QUEUE_LENGTH: &str = "framex_queue_length";

    pub const RATE_LIMIT_HITS_TOTAL: &str = "framex_rate_limit_hits_total";
}

// Fallback for requests that matched no route.
static ID_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/process/[^/]+").expect("valid regex"));

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_job_cancelled() {
    counter!(names::JOBS_CANCELLED_TOTAL).increment(1);
}

pub fn set_queue_length(length: u64) {
    gauge!(names::QUEUE_LENGTH).set(length as f64);
}

pub fn record_rate_limit_hit(path: &str) {
    counter!(names::RATE_LIMIT_HITS_TOTAL, "endpoint" => route_label(path)).increment(1);
}

/// Low-cardinality label for a raw request path.
fn route_label(path: &str) -> String {
    ID_SEGMENT.replace(path, "/process/:id").into_owned()
}

/// Keeps the in-flight gauge balanced even if the inner service panics.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);
    }
}

/// Count and time every request, labelled by route template.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let route = match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_owned(),
        None => route_label(request.uri().path()),
    };
    let method = request.method().as_str().to_owned();
    let started = Instant::now();

    let response = {
        let _guard = InFlight::enter();
        next.run(request).await
    };

    let labels = [
        ("method", method),
        ("path", route),
        ("status", response.status().as_u16().to_string()),
    ];
    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels)
        .record(started.elapsed().as_secs_f64());

    response
}
