//! Queue handlers: creation, draft placement, pause and resume.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use capflow_models::JobCreateRequest;

use crate::auth::Owner;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQueueRequest {
    pub name: String,
    pub project_id: Option<String>,
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultQueueRequest {
    pub project_id: Option<String>,
}

/// POST /api/queues
pub async fn create_queue(
    State(state): State<AppState>,
    owner: Owner,
    Json(request): Json<CreateQueueRequest>,
) -> ApiResult<Response> {
    let queue = state
        .jobs
        .create_queue(
            owner.as_str(),
            &request.name,
            request.project_id.as_deref(),
            request.max_concurrency,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(queue)).into_response())
}

/// POST /api/queues/default
pub async fn default_queue(
    State(state): State<AppState>,
    owner: Owner,
    Json(request): Json<DefaultQueueRequest>,
) -> ApiResult<Response> {
    let queue = state
        .jobs
        .get_or_create_default_queue(owner.as_str(), request.project_id.as_deref())
        .await?;
    Ok(Json(queue).into_response())
}

/// POST /api/queues/:id/jobs
pub async fn create_draft_job(
    State(state): State<AppState>,
    owner: Owner,
    Path(queue_id): Path<String>,
    Json(request): Json<JobCreateRequest>,
) -> ApiResult<Response> {
    let job = state.jobs.create_draft_job(owner.as_str(), &queue_id, request).await?;
    Ok((StatusCode::CREATED, Json(job)).into_response())
}

/// POST /api/queues/:id/pause
pub async fn pause_queue(
    State(state): State<AppState>,
    owner: Owner,
    Path(queue_id): Path<String>,
) -> ApiResult<Response> {
    let outcome = state.jobs.pause_queue(owner.as_str(), &queue_id).await?;
    Ok(Json(outcome).into_response())
}

/// POST /api/queues/:id/resume
///
/// Accepted once the drafts are queued; they run in the background.
pub async fn resume_queue(
    State(state): State<AppState>,
    owner: Owner,
    Path(queue_id): Path<String>,
) -> ApiResult<Response> {
    let outcome = state.jobs.resume_queue(owner.as_str(), &queue_id).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)).into_response())
}
