//! Caller identity.
//!
//! Authentication happens in front of this service; requests arrive with the
//! authenticated user in the `X-User-Id` header. Every job and queue
//! operation is scoped to that owner.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::middleware::USER_ID_HEADER;

/// Owner of the records a request touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl Owner {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Missing X-User-Id header"))?;
        Ok(Owner(owner.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<Owner, ApiError> {
        let (mut parts, _) = request.into_parts();
        Owner::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_reads_trimmed_owner() {
        let request = Request::builder().header("X-User-Id", " user-1 ").body(()).unwrap();
        assert_eq!(extract(request).await.unwrap(), Owner("user-1".into()));
    }

    #[tokio::test]
    async fn test_missing_or_blank_header_is_unauthorized() {
        let missing = Request::builder().body(()).unwrap();
        assert!(matches!(extract(missing).await, Err(ApiError::Unauthorized(_))));

        let blank = Request::builder().header("X-User-Id", "  ").body(()).unwrap();
        assert!(matches!(extract(blank).await, Err(ApiError::Unauthorized(_))));
    }
}
