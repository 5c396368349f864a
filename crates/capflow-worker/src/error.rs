//! Worker error types.
//!
//! One taxonomy for every job operation: callers branch on the variant,
//! the HTTP layer maps variants to status codes.

use thiserror::Error;

use capflow_firestore::FirestoreError;
use capflow_models::{JobStatus, ModelError, PlanTier};
use capflow_queue::QueueError;
use capflow_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{message}")]
    StateConflict { current: JobStatus, message: String },

    #[error("Stage failed: {0}")]
    StageExecution(String),

    #[error("{reason}")]
    Entitlement {
        reason: String,
        plan: PlanTier,
        current_usage: Option<u64>,
    },

    #[error("Media cache error: {0}")]
    Cache(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] FirestoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn state_conflict(current: JobStatus, msg: impl Into<String>) -> Self {
        Self::StateConflict {
            current,
            message: msg.into(),
        }
    }

    pub fn stage(msg: impl Into<String>) -> Self {
        Self::StageExecution(msg.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Caused by the request rather than by the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            WorkerError::Validation(_)
                | WorkerError::NotFound(_)
                | WorkerError::StateConflict { .. }
                | WorkerError::Entitlement { .. }
        )
    }
}

impl From<ModelError> for WorkerError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Validation(msg) => Self::Validation(msg),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<QueueError> for WorkerError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Validation(msg) => Self::Validation(msg),
            QueueError::NotFound(msg) => Self::NotFound(msg),
            QueueError::Entitlement {
                reason,
                plan,
                current_usage,
            } => Self::Entitlement {
                reason,
                plan,
                current_usage,
            },
            QueueError::Conflict(msg) => Self::StateConflict {
                current: JobStatus::Draft,
                message: msg,
            },
            QueueError::Store(e) => Self::Store(e),
        }
    }
}
