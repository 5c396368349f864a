//! Structured job logging.
//!
//! Uniform lifecycle events for pipeline runs, all carrying the job id and
//! the operation, plus a `job` span to attach stage events to.

use tracing::{error, info, warn, Span};

use capflow_models::JobId;

/// Job logger with the job id and operation attached to every event.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: &'static str,
}

impl JobLogger {
    /// Create a logger for one run of `operation` on a job.
    ///
    /// # Arguments
    /// * `job_id` - The job being processed
    /// * `operation` - What the run does (e.g. "subtitle_pipeline")
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation,
        }
    }

    /// Log the claim that starts a run.
    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, operation = self.operation, "Job started: {}", message);
    }

    /// Log entry into a pipeline stage with the progress written for it.
    pub fn log_stage(&self, stage: &str, progress: f64) {
        info!(job_id = %self.job_id, operation = self.operation, stage, progress, "Stage started");
    }

    /// Log a condition that ends the run without failing the job.
    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, operation = self.operation, "Job warning: {}", message);
    }

    /// Log the stage failure recorded on the job.
    pub fn log_error(&self, stage: &str, message: &str) {
        error!(job_id = %self.job_id, operation = self.operation, stage, "Job error: {}", message);
    }

    /// Log a run that reached `done`.
    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, operation = self.operation, "Job completed: {}", message);
    }

    /// Get the job ID.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Get the operation name.
    pub fn operation(&self) -> &str {
        self.operation
    }

    /// Create the `job` span the run executes in.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, operation = self.operation)
    }
}
