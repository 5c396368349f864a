//! Periodic scan for jobs stuck in a stage.
//!
//! A job counts as stalled when it sits in an in-flight status and has not
//! been written for longer than the threshold, e.g. after its worker process
//! died. Stalled jobs are only reported; recovery is an explicit retry or a
//! forced start by the owner.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};

use capflow_firestore::{FirestoreResult, JobStore};
use capflow_models::JobStatus;

use crate::metrics;

pub struct StaleJobDetector {
    jobs: Arc<dyn JobStore>,
    threshold: Duration,
    scan_interval: Duration,
}

impl StaleJobDetector {
    pub fn new(jobs: Arc<dyn JobStore>, threshold: Duration, scan_interval: Duration) -> Self {
        Self {
            jobs,
            threshold,
            scan_interval,
        }
    }

    /// Scan forever; spawn as a background task.
    pub async fn run(&self) {
        info!(
            interval_secs = self.scan_interval.as_secs(),
            threshold_secs = self.threshold.as_secs(),
            "Starting stale job detector"
        );
        let mut ticker = interval(self.scan_interval);

        loop {
            ticker.tick().await;
            if let Err(e) = self.check_once().await {
                error!(error = %e, "Stale job detection failed");
            }
        }
    }

    /// One scan; returns the number of stalled jobs found.
    pub async fn check_once(&self) -> FirestoreResult<usize> {
        let threshold = chrono::Duration::from_std(self.threshold).unwrap_or_else(|_| chrono::Duration::days(365));
        let before = Utc::now() - threshold;
        let stale = self.jobs.stale(&JobStatus::ACTIVE, before).await?;

        for job in &stale {
            warn!(
                job_id = %job.id,
                owner_id = %job.owner_id,
                status = %job.status,
                updated_at = %job.updated_at,
                "Job looks stalled"
            );
        }
        metrics::set_stale_jobs(stale.len());
        Ok(stale.len())
    }
}
