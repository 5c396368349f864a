//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return the render handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "capflow_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "capflow_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "capflow_http_requests_in_flight";
    pub const STALE_JOBS: &str = "capflow_stale_jobs";
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Jobs found stalled by the last detector pass.
pub fn set_stale_jobs(count: usize) {
    gauge!(names::STALE_JOBS).set(count as f64);
}

const ACTIONS: [&str; 5] = ["bulk", "default", "start", "cancel", "retry"];

/// Replace record ids with `:id` so labels stay low-cardinality.
fn sanitize_path(path: &str) -> String {
    let mut previous = "";
    let segments: Vec<&str> = path
        .split('/')
        .map(|segment| {
            let is_id = matches!(previous, "jobs" | "queues") && !segment.is_empty() && !ACTIONS.contains(&segment);
            previous = segment;
            if is_id {
                ":id"
            } else {
                segment
            }
        })
        .collect();
    segments.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed().as_secs_f64());

    response
}
