//! Detached job runs.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use capflow_models::JobId;
use capflow_queue::JobRunner;

use crate::executor::{PipelineExecutor, RunOutcome};

/// Starts pipeline runs on the runtime without holding the caller.
#[derive(Clone)]
pub struct DetachedRunner {
    executor: Arc<PipelineExecutor>,
}

impl DetachedRunner {
    pub fn new(executor: Arc<PipelineExecutor>) -> Self {
        Self { executor }
    }

    /// Spawn a run. Outcomes and store errors are logged, never returned.
    pub fn spawn(&self, id: JobId, force: bool) -> JoinHandle<()> {
        let executor = self.executor.clone();
        tokio::spawn(async move {
            match executor.run(&id, force).await {
                Ok(outcome) => debug!(job_id = %id, outcome = outcome_label(&outcome), "Detached run finished"),
                Err(e) => error!(job_id = %id, error = %e, "Detached run aborted"),
            }
        })
    }
}

fn outcome_label(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Skipped { .. } => "skipped",
        RunOutcome::Canceled { .. } => "canceled",
        RunOutcome::Completed(_) => "completed",
        RunOutcome::Failed { .. } => "failed",
    }
}

/// Queue drains await each run so the batch counts real outcomes.
#[async_trait]
impl JobRunner for DetachedRunner {
    async fn run(&self, id: JobId) -> anyhow::Result<()> {
        match self.executor.run(&id, false).await? {
            RunOutcome::Failed { stage, message } => {
                anyhow::bail!("{} failed: {}", stage.name(), message)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use capflow_models::{Job, JobStatus};

    #[tokio::test]
    async fn test_spawned_run_completes() {
        let h = Harness::new();
        let job = h.insert(Job::from_url("owner-1", "https://cdn.test/a.mp4")).await;

        DetachedRunner::new(h.executor.clone()).spawn(job.id.clone(), false).await.unwrap();

        assert_eq!(h.job(&job.id).await.status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_runner_reports_stage_failures() {
        let h = Harness::with_ops(|ops| ops.failing("translate"));
        let job = h.insert(Job::from_url("owner-1", "https://cdn.test/a.mp4")).await;

        let err = JobRunner::run(&DetachedRunner::new(h.executor.clone()), job.id.clone())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "translate failed: translate unavailable");
    }
}
