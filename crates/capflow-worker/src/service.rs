//! Job operations exposed to the HTTP layer.
//!
//! Every operation is scoped to an owner: records of other owners read as
//! missing. Status changes made here go through the same compare-and-set
//! writes the executor uses, so a cancel racing a stage write resolves to
//! exactly one winner.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use capflow_firestore::{Stores, Transition};
use capflow_models::{
    CaptionData, Job, JobCreateRequest, JobFilter, JobId, JobPage, JobPatch, JobStatus, Queue, Sequence,
    StatusCounts, SubtitleConfig, VideoCut,
};
use capflow_queue::{EntitlementGate, PauseOutcome, QueueStateManager, ResumeOutcome};

use crate::error::{WorkerError, WorkerResult};
use crate::executor::PipelineExecutor;
use crate::runner::DetachedRunner;

/// User-editable job fields.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub cuts: Option<Vec<VideoCut>>,
    pub sequence: Option<Sequence>,
    pub caption_edit: Option<CaptionData>,
    pub subtitle_config: Option<SubtitleConfig>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Moving a job back to `pending` also drops the step and error left
    /// by its previous run.
    fn into_patch(self) -> JobPatch {
        let base = match self.status {
            Some(JobStatus::Pending) => JobPatch::retry_reset(),
            status => JobPatch {
                status,
                ..JobPatch::new()
            },
        };
        JobPatch {
            cuts: self.cuts,
            sequence: self.sequence,
            caption_edit: self.caption_edit,
            subtitle_config: self.subtitle_config,
            ..base
        }
    }
}

/// Result of one id in a bulk operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItem {
    pub id: JobId,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BulkItem>,
}

impl BulkOutcome {
    fn record<T>(&mut self, id: JobId, result: WorkerResult<T>) {
        match result {
            Ok(_) => {
                self.succeeded += 1;
                self.results.push(BulkItem { id, ok: true, error: None });
            }
            Err(e) => {
                self.failed += 1;
                self.results.push(BulkItem {
                    id,
                    ok: false,
                    error: Some(e.to_string()),
                });
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOutcome {
    pub job: Job,
    pub original_job_id: JobId,
}

/// Statuses bulk retry resets from: failures, cancellations and stalls.
fn bulk_retryable() -> Vec<JobStatus> {
    let mut statuses = vec![JobStatus::Error, JobStatus::Canceled];
    statuses.extend(JobStatus::ACTIVE);
    statuses
}

fn cancelable() -> Vec<JobStatus> {
    let mut statuses = vec![JobStatus::Pending];
    statuses.extend(JobStatus::ACTIVE);
    statuses
}

#[derive(Clone)]
pub struct JobService {
    stores: Stores,
    runner: DetachedRunner,
    queues: QueueStateManager,
}

impl JobService {
    pub fn new(stores: Stores, executor: Arc<PipelineExecutor>, gate: Arc<dyn EntitlementGate>) -> Self {
        let runner = DetachedRunner::new(executor);
        let queues = QueueStateManager::new(stores.clone(), gate, Arc::new(runner.clone()));
        Self { stores, runner, queues }
    }

    /// Validate and store a pending job, starting it unless `autoStart` is off.
    pub async fn create_job(&self, owner_id: &str, request: JobCreateRequest) -> WorkerResult<Job> {
        let auto_start = request.auto_start;
        let job = request.into_job(owner_id)?;
        self.stores.jobs.insert(&job).await?;
        info!(job_id = %job.id, owner_id = %owner_id, source_type = %job.source_type, auto_start, "Created job");

        if auto_start {
            self.runner.spawn(job.id.clone(), false);
        }
        Ok(job)
    }

    pub async fn get_job(&self, owner_id: &str, id: &JobId) -> WorkerResult<Job> {
        self.stores
            .jobs
            .get(id)
            .await?
            .filter(|job| job.owner_id == owner_id)
            .ok_or_else(|| WorkerError::not_found(format!("Job {} not found", id)))
    }

    /// Apply a user edit. A status change must follow the status graph.
    pub async fn patch_job(&self, owner_id: &str, id: &JobId, update: JobUpdate) -> WorkerResult<Job> {
        let patch = update.into_patch();
        if patch.is_empty() {
            return Err(WorkerError::validation("No updatable fields provided"));
        }

        let job = self.get_job(owner_id, id).await?;
        let Some(next) = patch.status else {
            return self
                .stores
                .jobs
                .update(id, &patch)
                .await?
                .ok_or_else(|| WorkerError::not_found(format!("Job {} not found", id)));
        };

        if !job.status.can_transition_to(next) {
            return Err(WorkerError::state_conflict(
                job.status,
                format!("Cannot move job from {} to {}", job.status, next),
            ));
        }
        self.write_if_status(id, &[job.status], &patch).await
    }

    /// Hard-delete a job that is not being processed.
    pub async fn delete_job(&self, owner_id: &str, id: &JobId) -> WorkerResult<()> {
        let job = self.get_job(owner_id, id).await?;
        if !job.status.is_deletable() {
            return Err(WorkerError::state_conflict(
                job.status,
                format!("Cannot delete job while it is {}", job.status),
            ));
        }
        if !self.stores.jobs.delete(id).await? {
            return Err(WorkerError::not_found(format!("Job {} not found", id)));
        }
        info!(job_id = %id, "Deleted job");
        Ok(())
    }

    pub async fn list_jobs(&self, owner_id: &str, mut filter: JobFilter) -> WorkerResult<JobPage> {
        filter.owner_id = Some(owner_id.to_string());
        Ok(self.stores.jobs.list(&filter).await?)
    }

    pub async fn count_by_status(&self, owner_id: &str) -> WorkerResult<StatusCounts> {
        Ok(self.stores.jobs.count_by_status(owner_id).await?)
    }

    /// Start the pipeline. `force` also accepts a job stuck in a stage.
    pub async fn start_job(&self, owner_id: &str, id: &JobId, force: bool) -> WorkerResult<Job> {
        let job = self.get_job(owner_id, id).await?;
        if !(job.status.is_startable() || (force && job.status.is_active())) {
            return Err(WorkerError::state_conflict(
                job.status,
                format!("Cannot start job in status {}", job.status),
            ));
        }
        self.runner.spawn(job.id.clone(), force);
        Ok(job)
    }

    /// Cancel a pending or running job. Step is cleared, progress kept.
    pub async fn cancel_job(&self, owner_id: &str, id: &JobId) -> WorkerResult<Job> {
        let job = self.get_job(owner_id, id).await?;
        if !job.status.is_cancelable() {
            return Err(WorkerError::state_conflict(
                job.status,
                format!("Cannot cancel job in status {}", job.status),
            ));
        }
        let canceled = self.write_if_status(id, &cancelable(), &JobPatch::canceled()).await?;
        info!(job_id = %id, progress = canceled.progress, "Canceled job");
        Ok(canceled)
    }

    /// Retry into a fresh record; the original is left as it is.
    pub async fn retry_job(&self, owner_id: &str, id: &JobId) -> WorkerResult<RetryOutcome> {
        let original = self.get_job(owner_id, id).await?;
        if !original.status.is_retryable() {
            return Err(WorkerError::state_conflict(
                original.status,
                format!("Cannot retry job in status {}", original.status),
            ));
        }

        let job = original.fork();
        self.stores.jobs.insert(&job).await?;
        info!(job_id = %job.id, original_job_id = %original.id, "Retrying job as a new record");
        self.runner.spawn(job.id.clone(), false);

        Ok(RetryOutcome {
            job,
            original_job_id: original.id,
        })
    }

    pub async fn bulk_update(&self, owner_id: &str, ids: &[JobId], update: JobUpdate) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for id in ids {
            let result = self.patch_job(owner_id, id, update.clone()).await;
            outcome.record(id.clone(), result);
        }
        outcome
    }

    /// Delete every id that is not being processed; active ids fail alone.
    pub async fn bulk_delete(&self, owner_id: &str, ids: &[JobId]) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for id in ids {
            let result = self.delete_job(owner_id, id).await;
            outcome.record(id.clone(), result);
        }
        outcome
    }

    pub async fn bulk_cancel(&self, owner_id: &str, ids: &[JobId]) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for id in ids {
            let result = self.cancel_job(owner_id, id).await;
            outcome.record(id.clone(), result);
        }
        outcome
    }

    /// Reset each record in place to `pending` and run it again.
    ///
    /// Unlike [`JobService::retry_job`] no new record is created. Stalled
    /// jobs in a stage status are accepted; their old run loses its next
    /// status write and stops.
    pub async fn bulk_retry(&self, owner_id: &str, ids: &[JobId]) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for id in ids {
            let result = self.reset_for_retry(owner_id, id).await;
            if result.is_ok() {
                self.runner.spawn(id.clone(), false);
            }
            outcome.record(id.clone(), result);
        }
        outcome
    }

    async fn reset_for_retry(&self, owner_id: &str, id: &JobId) -> WorkerResult<Job> {
        let job = self.get_job(owner_id, id).await?;
        let allowed = bulk_retryable();
        if !allowed.contains(&job.status) {
            return Err(WorkerError::state_conflict(
                job.status,
                format!("Cannot retry job in status {}", job.status),
            ));
        }
        self.write_if_status(id, &allowed, &JobPatch::retry_reset()).await
    }

    async fn write_if_status(&self, id: &JobId, expected: &[JobStatus], patch: &JobPatch) -> WorkerResult<Job> {
        match self.stores.jobs.update_if_status(id, expected, patch).await? {
            Transition::Applied(job) => Ok(job),
            Transition::Conflict { current: Some(current), .. } => {
                warn!(job_id = %id, current = %current, "Job changed concurrently");
                Err(WorkerError::state_conflict(
                    current,
                    format!("Job changed concurrently and is now {}", current),
                ))
            }
            Transition::Conflict { current: None, .. } => Err(WorkerError::not_found(format!("Job {} not found", id))),
        }
    }

    pub fn queues(&self) -> &QueueStateManager {
        &self.queues
    }

    pub async fn create_queue(
        &self,
        owner_id: &str,
        name: &str,
        project_id: Option<&str>,
        max_concurrency: Option<usize>,
    ) -> WorkerResult<Queue> {
        Ok(self.queues.create_queue(owner_id, name, project_id, max_concurrency).await?)
    }

    pub async fn get_or_create_default_queue(&self, owner_id: &str, project_id: Option<&str>) -> WorkerResult<Queue> {
        Ok(self.queues.get_or_create_default_queue(owner_id, project_id).await?)
    }

    pub async fn create_draft_job(
        &self,
        owner_id: &str,
        queue_id: &str,
        request: JobCreateRequest,
    ) -> WorkerResult<Job> {
        Ok(self.queues.create_draft_job(owner_id, queue_id, request).await?)
    }

    pub async fn pause_queue(&self, owner_id: &str, queue_id: &str) -> WorkerResult<PauseOutcome> {
        Ok(self.queues.pause_queue(owner_id, queue_id).await?)
    }

    pub async fn resume_queue(&self, owner_id: &str, queue_id: &str) -> WorkerResult<ResumeOutcome> {
        Ok(self.queues.resume_queue(owner_id, queue_id).await?)
    }
}
