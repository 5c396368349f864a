//! Axum HTTP API server.
//!
//! This crate provides:
//! - Job and queue endpoints over the worker's `JobService`
//! - Owner scoping through the `X-User-Id` header
//! - Security headers, request ids and request logging
//! - Prometheus metrics and the stale job detector

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{ApiConfig, StoreBackend};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::StaleJobDetector;
pub use state::AppState;
