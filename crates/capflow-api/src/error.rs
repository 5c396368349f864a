//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use capflow_models::{JobStatus, PlanTier};
use capflow_worker::WorkerError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{message}")]
    Conflict { current: JobStatus, message: String },

    #[error("{reason}")]
    Entitlement {
        reason: String,
        plan: PlanTier,
        current_usage: Option<u64>,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Worker(WorkerError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Entitlement { .. } => StatusCode::FORBIDDEN,
            ApiError::Internal(_) | ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_internal(&self) -> bool {
        matches!(self, ApiError::Internal(_) | ApiError::Worker(_))
    }
}

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        match e {
            WorkerError::Validation(msg) => Self::BadRequest(msg),
            WorkerError::NotFound(msg) => Self::NotFound(msg),
            WorkerError::StateConflict { current, message } => Self::Conflict { current, message },
            WorkerError::Entitlement {
                reason,
                plan,
                current_usage,
            } => Self::Entitlement {
                reason,
                plan,
                current_usage,
            },
            other => Self::Worker(other),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<PlanTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_usage: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.is_internal() {
            tracing::error!(error = %self, "Request failed");
        }

        // Don't expose internal error details in production
        let detail = if self.is_internal() && std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = match self {
            ApiError::Conflict { current, .. } => ErrorResponse {
                detail,
                code: Some(current.to_string()),
                plan: None,
                current_usage: None,
            },
            ApiError::Entitlement { plan, current_usage, .. } => ErrorResponse {
                detail,
                code: Some("entitlement".to_string()),
                plan: Some(plan),
                current_usage,
            },
            _ => ErrorResponse {
                detail,
                code: None,
                plan: None,
                current_usage: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_conflict_reports_current_status() {
        let err: ApiError = WorkerError::state_conflict(JobStatus::Done, "Cannot cancel job in status done").into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = body_json(response).await;
        assert_eq!(body["detail"], "Cannot cancel job in status done");
        assert_eq!(body["code"], "done");
    }

    #[tokio::test]
    async fn test_entitlement_carries_plan_and_usage() {
        let err: ApiError = WorkerError::Entitlement {
            reason: "Monthly limit reached".into(),
            plan: PlanTier::Free,
            current_usage: Some(10),
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["code"], "entitlement");
        assert_eq!(body["plan"], serde_json::to_value(PlanTier::Free).unwrap());
        assert_eq!(body["currentUsage"], 10);
    }

    #[test]
    fn test_worker_errors_map_to_client_statuses() {
        let validation: ApiError = WorkerError::validation("bad").into();
        assert_eq!(validation.status_code(), StatusCode::BAD_REQUEST);
        let missing: ApiError = WorkerError::not_found("Job x not found").into();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        let stage: ApiError = WorkerError::stage("boom").into();
        assert_eq!(stage.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
