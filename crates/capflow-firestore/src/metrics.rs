//! Firestore request metrics.
//!
//! Everything the job store does against Firestore is counted here:
//! - requests by operation and HTTP status, with latency
//! - retries of transient failures
//! - compare-and-set writes that lost to a concurrent writer

use metrics::{counter, histogram};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants shared by the recorders and dashboards.
pub mod names {
    /// Total Firestore requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "firestore_requests_total";

    /// Total retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "firestore_retries_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "firestore_latency_seconds";

    /// Compare-and-set writes rejected because the document changed.
    pub const CAS_CONFLICTS_TOTAL: &str = "firestore_cas_conflicts_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record a completed request and its latency.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record one retry of a transient failure.
pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

/// Record a precondition failure on a conditional write to `collection`.
pub fn record_cas_conflict(collection: &str) {
    counter!(names::CAS_CONFLICTS_TOTAL, "collection" => collection.to_string()).increment(1);
}

// =============================================================================
// Tests
// =============================================================================
