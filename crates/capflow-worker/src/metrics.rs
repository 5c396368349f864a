//! Pipeline metrics.

use std::time::Duration;

use capflow_models::{JobStatus, MediaCacheKind};

pub mod names {
    pub const JOBS_STARTED: &str = "capflow_jobs_started_total";
    pub const JOBS_FINISHED: &str = "capflow_jobs_finished_total";
    pub const STAGE_DURATION: &str = "capflow_stage_duration_seconds";
    pub const MEDIA_CACHE_LOOKUPS: &str = "capflow_media_cache_lookups_total";
    pub const WEBHOOK_DELIVERIES: &str = "capflow_webhook_deliveries_total";
}

pub fn record_job_started() {
    metrics::counter!(names::JOBS_STARTED).increment(1);
}

pub fn record_job_finished(status: JobStatus) {
    metrics::counter!(names::JOBS_FINISHED, "status" => status.as_str()).increment(1);
}

pub fn record_stage_duration(stage: &'static str, elapsed: Duration) {
    metrics::histogram!(names::STAGE_DURATION, "stage" => stage).record(elapsed.as_secs_f64());
}

/// `result` is one of `hit`, `miss`, `error`.
pub fn record_cache_lookup(kind: MediaCacheKind, result: &'static str) {
    metrics::counter!(names::MEDIA_CACHE_LOOKUPS, "kind" => kind.as_str(), "result" => result).increment(1);
}

pub fn record_webhook_delivery(success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!(names::WEBHOOK_DELIVERIES, "result" => result).increment(1);
}
