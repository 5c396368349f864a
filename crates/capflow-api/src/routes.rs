//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::health;
use crate::handlers::jobs::{
    bulk_jobs, cancel_job, create_job, delete_job, get_job, list_jobs, retry_job, start_job, update_job,
};
use crate::handlers::queues::{create_draft_job, create_queue, default_queue, pause_queue, resume_queue};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/bulk", post(bulk_jobs))
        .route("/jobs/:id", get(get_job).patch(update_job).delete(delete_job))
        .route("/jobs/:id/start", post(start_job))
        .route("/jobs/:id/cancel", post(cancel_job))
        .route("/jobs/:id/retry", post(retry_job));

    let queue_routes = Router::new()
        .route("/queues", post(create_queue))
        .route("/queues/default", post(default_queue))
        .route("/queues/:id/jobs", post(create_draft_job))
        .route("/queues/:id/pause", post(pause_queue))
        .route("/queues/:id/resume", post(resume_queue));

    let metrics_routes = match metrics_handle {
        Some(handle) => Router::new().route("/metrics", get(move || async move { handle.render() })),
        None => Router::new(),
    };

    Router::new()
        .nest("/api", job_routes.merge(queue_routes))
        .route("/health", get(health))
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
