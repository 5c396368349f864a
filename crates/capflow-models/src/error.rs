//! Model-level error types.

use thiserror::Error;

/// Result type for model conversions and validation.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while parsing or validating model values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("Invalid job status: {0}")]
    InvalidStatus(String),

    #[error("Invalid job step: {0}")]
    InvalidStep(String),

    #[error("Invalid source type: {0}")]
    InvalidSourceType(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl ModelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<validator::ValidationErrors> for ModelError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
