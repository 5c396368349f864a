//! Job handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use capflow_models::{JobCreateRequest, JobFilter, JobId, StatusFilter};
use capflow_worker::{BulkOutcome, JobUpdate};

use crate::auth::Owner;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Most ids a single bulk request may name.
pub const MAX_BULK_IDS: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub project_id: Option<String>,
    pub queue_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Return per-status counts instead of a page
    #[serde(default)]
    pub counts: bool,
}

impl ListJobsQuery {
    fn into_filter(self, owner_id: &str) -> ApiResult<JobFilter> {
        let status = self
            .status
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<StatusFilter>())
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;

        let defaults = JobFilter::for_owner(owner_id);
        Ok(JobFilter {
            status,
            search: self.search.filter(|s| !s.trim().is_empty()),
            project_id: self.project_id,
            queue_id: self.queue_id,
            start_date: self.start_date,
            end_date: self.end_date,
            page: self.page.unwrap_or(defaults.page),
            limit: self.limit.unwrap_or(defaults.limit),
            ..defaults
        })
    }
}

/// POST /api/jobs
pub async fn create_job(
    State(state): State<AppState>,
    owner: Owner,
    Json(request): Json<JobCreateRequest>,
) -> ApiResult<Response> {
    let job = state.jobs.create_job(owner.as_str(), request).await?;
    Ok((StatusCode::CREATED, Json(job)).into_response())
}

/// GET /api/jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    owner: Owner,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Response> {
    if query.counts {
        let counts = state.jobs.count_by_status(owner.as_str()).await?;
        return Ok(Json(serde_json::json!({ "counts": counts })).into_response());
    }

    let filter = query.into_filter(owner.as_str())?;
    let page = state.jobs.list_jobs(owner.as_str(), filter).await?;
    Ok(Json(page).into_response())
}

/// GET /api/jobs/:id
pub async fn get_job(State(state): State<AppState>, owner: Owner, Path(id): Path<String>) -> ApiResult<Response> {
    let job = state.jobs.get_job(owner.as_str(), &JobId::from_string(id)).await?;
    Ok(Json(job).into_response())
}

/// PATCH /api/jobs/:id
pub async fn update_job(
    State(state): State<AppState>,
    owner: Owner,
    Path(id): Path<String>,
    Json(update): Json<JobUpdate>,
) -> ApiResult<Response> {
    let job = state
        .jobs
        .patch_job(owner.as_str(), &JobId::from_string(id), update)
        .await?;
    Ok(Json(job).into_response())
}

/// DELETE /api/jobs/:id
pub async fn delete_job(State(state): State<AppState>, owner: Owner, Path(id): Path<String>) -> ApiResult<StatusCode> {
    state.jobs.delete_job(owner.as_str(), &JobId::from_string(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct StartQuery {
    #[serde(default)]
    pub force: bool,
}

/// POST /api/jobs/:id/start
pub async fn start_job(
    State(state): State<AppState>,
    owner: Owner,
    Path(id): Path<String>,
    Query(query): Query<StartQuery>,
) -> ApiResult<Response> {
    let job = state
        .jobs
        .start_job(owner.as_str(), &JobId::from_string(id), query.force)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(job)).into_response())
}

/// POST /api/jobs/:id/cancel
pub async fn cancel_job(State(state): State<AppState>, owner: Owner, Path(id): Path<String>) -> ApiResult<Response> {
    let job = state.jobs.cancel_job(owner.as_str(), &JobId::from_string(id)).await?;
    Ok(Json(job).into_response())
}

/// POST /api/jobs/:id/retry
pub async fn retry_job(State(state): State<AppState>, owner: Owner, Path(id): Path<String>) -> ApiResult<Response> {
    let outcome = state.jobs.retry_job(owner.as_str(), &JobId::from_string(id)).await?;
    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Delete,
    Cancel,
    Retry,
    Update,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    pub action: BulkAction,
    pub job_ids: Vec<JobId>,
    pub patch: Option<JobUpdate>,
}

/// POST /api/jobs/bulk
///
/// Each id is handled on its own; one failing id does not stop the rest.
pub async fn bulk_jobs(
    State(state): State<AppState>,
    owner: Owner,
    Json(request): Json<BulkRequest>,
) -> ApiResult<Json<BulkOutcome>> {
    if request.job_ids.is_empty() {
        return Err(ApiError::bad_request("jobIds must not be empty"));
    }
    if request.job_ids.len() > MAX_BULK_IDS {
        return Err(ApiError::bad_request(format!(
            "At most {} jobs per bulk request",
            MAX_BULK_IDS
        )));
    }

    let owner = owner.as_str();
    let ids = &request.job_ids;
    let outcome = match request.action {
        BulkAction::Delete => state.jobs.bulk_delete(owner, ids).await,
        BulkAction::Cancel => state.jobs.bulk_cancel(owner, ids).await,
        BulkAction::Retry => state.jobs.bulk_retry(owner, ids).await,
        BulkAction::Update => {
            let patch = request
                .patch
                .ok_or_else(|| ApiError::bad_request("patch is required for the update action"))?;
            state.jobs.bulk_update(owner, ids, patch).await
        }
    };

    tracing::info!(
        owner_id = %owner,
        action = ?request.action,
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        "Bulk job operation"
    );
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use capflow_models::JobStatus;

    #[test]
    fn test_query_builds_owner_scoped_filter() {
        let query = ListJobsQuery {
            status: Some("processing".into()),
            search: Some("  ".into()),
            page: Some(3),
            ..Default::default()
        };
        let filter = query.into_filter("u1").unwrap();
        assert_eq!(filter.owner_id.as_deref(), Some("u1"));
        assert_eq!(filter.status, Some(StatusFilter::Processing));
        assert_eq!(filter.search, None);
        assert_eq!(filter.page, 3);
        assert_eq!(filter.limit, capflow_models::DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn test_exact_status_and_unknown_status() {
        let query = ListJobsQuery {
            status: Some("done".into()),
            ..Default::default()
        };
        assert_eq!(
            query.into_filter("u1").unwrap().status,
            Some(StatusFilter::Exact(JobStatus::Done))
        );

        let query = ListJobsQuery {
            status: Some("sleeping".into()),
            ..Default::default()
        };
        assert!(matches!(query.into_filter("u1"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_bulk_request_wire_format() {
        let request: BulkRequest = serde_json::from_value(serde_json::json!({
            "action": "update",
            "jobIds": ["a", "b"],
            "patch": { "status": "pending" }
        }))
        .unwrap();
        assert_eq!(request.action, BulkAction::Update);
        assert_eq!(request.job_ids, vec![JobId::from_string("a"), JobId::from_string("b")]);
        assert_eq!(request.patch, Some(JobUpdate::status(JobStatus::Pending)));
    }
}
