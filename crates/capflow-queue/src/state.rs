//! Queue state manager: draft placement, pause and resume.
//!
//! A queue is either active or paused. While paused none of its jobs sit in
//! `queued`; pausing parks them back as drafts and lets running jobs finish.
//! Resuming is all or nothing: the whole draft set is checked against the
//! entitlement gate, moved to `queued` in one atomic write, then drained in
//! the background at the plan's concurrency.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use capflow_firestore::{FirestoreError, Stores, Transition};
use capflow_models::{Job, JobCreateRequest, JobId, JobPatch, JobStatus, PlanTier, Queue, QueueStatus};

use crate::batch::{process_batch, BatchReport};
use crate::entitlement::EntitlementGate;
use crate::error::{QueueError, QueueResult};

pub const DEFAULT_QUEUE_NAME: &str = "Default Queue";

/// Drives one job through the pipeline.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, id: JobId) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseOutcome {
    pub queue_id: String,
    pub jobs_reverted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeOutcome {
    pub queue_id: String,
    pub count: usize,
    pub concurrency: usize,
    pub plan: PlanTier,
}

#[derive(Clone)]
pub struct QueueStateManager {
    stores: Stores,
    gate: Arc<dyn EntitlementGate>,
    runner: Arc<dyn JobRunner>,
}

impl QueueStateManager {
    pub fn new(stores: Stores, gate: Arc<dyn EntitlementGate>, runner: Arc<dyn JobRunner>) -> Self {
        Self { stores, gate, runner }
    }

    pub async fn create_queue(
        &self,
        owner_id: &str,
        name: &str,
        project_id: Option<&str>,
        max_concurrency: Option<usize>,
    ) -> QueueResult<Queue> {
        let name = name.trim();
        if name.is_empty() {
            return Err(QueueError::validation("Queue name is required"));
        }

        let mut queue = Queue::new(owner_id, name);
        if let Some(project_id) = project_id {
            queue = queue.with_project(project_id);
        }
        if let Some(max) = max_concurrency {
            queue = queue.with_max_concurrency(max);
        }

        self.stores.queues.insert(&queue).await?;
        info!(queue_id = %queue.id, owner_id = %owner_id, "Created queue");
        Ok(queue)
    }

    /// Queue owned by `owner_id`; other owners' queues read as missing.
    pub async fn get_queue(&self, owner_id: &str, queue_id: &str) -> QueueResult<Queue> {
        self.stores
            .queues
            .get(queue_id)
            .await?
            .filter(|q| q.owner_id == owner_id)
            .ok_or_else(|| QueueError::not_found(format!("Queue {} not found", queue_id)))
    }

    pub async fn get_or_create_default_queue(&self, owner_id: &str, project_id: Option<&str>) -> QueueResult<Queue> {
        if let Some(queue) = self
            .stores
            .queues
            .find_by_name(owner_id, project_id, DEFAULT_QUEUE_NAME)
            .await?
        {
            return Ok(queue);
        }
        self.create_queue(owner_id, DEFAULT_QUEUE_NAME, project_id, None).await
    }

    /// Append a draft job at the end of the queue.
    pub async fn create_draft_job(
        &self,
        owner_id: &str,
        queue_id: &str,
        request: JobCreateRequest,
    ) -> QueueResult<Job> {
        let queue = self.get_queue(owner_id, queue_id).await?;
        let Some(project_id) = queue.project_id.clone() else {
            return Err(QueueError::validation(format!(
                "Queue {} has no associated project; cannot create draft job",
                queue_id
            )));
        };

        let job = request.into_job(owner_id)?.with_project(project_id);
        let job = match self.stores.jobs.insert_draft(job, queue_id).await {
            Ok(job) => job,
            Err(FirestoreError::NotFound(_)) => {
                return Err(QueueError::not_found(format!("Queue {} not found", queue_id)))
            }
            Err(e) => return Err(e.into()),
        };

        info!(job_id = %job.id, queue_id = %queue_id, position = ?job.queue_position, "Created draft job");
        Ok(job)
    }

    /// Pause the queue and park its queued jobs as drafts.
    pub async fn pause_queue(&self, owner_id: &str, queue_id: &str) -> QueueResult<PauseOutcome> {
        self.get_queue(owner_id, queue_id).await?;
        self.stores.queues.set_status(queue_id, QueueStatus::Paused).await?;

        let queued = self.stores.jobs.queue_jobs(queue_id, Some(JobStatus::Queued)).await?;
        let revert = JobPatch::status(JobStatus::Draft);
        let mut reverted = 0;
        for job in &queued {
            // A job admitted meanwhile has left `queued` and keeps running
            match self
                .stores
                .jobs
                .update_if_status(&job.id, &[JobStatus::Queued], &revert)
                .await?
            {
                Transition::Applied(_) => reverted += 1,
                Transition::Conflict { current, .. } => {
                    info!(job_id = %job.id, current = ?current, "Job left queued before pause, leaving it");
                }
            }
        }

        info!(queue_id = %queue_id, reverted, "Paused queue");
        Ok(PauseOutcome {
            queue_id: queue_id.to_string(),
            jobs_reverted: reverted,
        })
    }

    /// Resume the queue; the batch runs detached.
    pub async fn resume_queue(&self, owner_id: &str, queue_id: &str) -> QueueResult<ResumeOutcome> {
        let (outcome, _batch) = self.resume_queue_tracked(owner_id, queue_id).await?;
        Ok(outcome)
    }

    /// Resume the queue, returning a handle on the background batch.
    pub async fn resume_queue_tracked(
        &self,
        owner_id: &str,
        queue_id: &str,
    ) -> QueueResult<(ResumeOutcome, JoinHandle<BatchReport>)> {
        let queue = self.get_queue(owner_id, queue_id).await?;

        let ids: Vec<JobId> = self
            .stores
            .jobs
            .queue_jobs(queue_id, Some(JobStatus::Draft))
            .await?
            .into_iter()
            .map(|j| j.id)
            .collect();
        if ids.is_empty() {
            return Err(QueueError::validation("No draft jobs to resume"));
        }

        let decision = self.gate.can_run_batch(owner_id, ids.len()).await?;
        if !decision.allowed {
            return Err(QueueError::Entitlement {
                reason: decision
                    .reason
                    .unwrap_or_else(|| "Usage limit exceeded".to_string()),
                plan: decision.plan,
                current_usage: decision.current_usage,
            });
        }

        self.stores.queues.set_status(queue_id, QueueStatus::Active).await?;

        match self
            .stores
            .jobs
            .update_all_if_status(&ids, &[JobStatus::Draft], &JobPatch::status(JobStatus::Queued))
            .await?
        {
            Transition::Applied(_) => {}
            Transition::Conflict { id, current } => {
                warn!(queue_id = %queue_id, job_id = %id, current = ?current, "Draft changed during resume");
                return Err(QueueError::conflict(format!(
                    "Job {} is no longer a draft; nothing was queued",
                    id
                )));
            }
        }

        let concurrency = queue.effective_concurrency(self.gate.concurrency_limit(decision.plan));
        let count = ids.len();
        info!(queue_id = %queue_id, plan = %decision.plan, count, concurrency, "Resuming queue");

        let runner = self.runner.clone();
        let label = queue_id.to_string();
        let batch = tokio::spawn(async move {
            let report = process_batch(ids, concurrency, move |id: JobId| {
                let runner = runner.clone();
                async move { runner.run(id).await }
            })
            .await;
            info!(queue_id = %label, succeeded = report.succeeded, failed = report.failed, "Queue batch finished");
            report
        });

        Ok((
            ResumeOutcome {
                queue_id: queue_id.to_string(),
                count,
                concurrency,
                plan: decision.plan,
            },
            batch,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlement::PlanEntitlementGate;
    use capflow_firestore::{JobStore, MemoryStore, QueueStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records runs and moves the job through to done.
    struct RecordingRunner {
        store: MemoryStore,
        ran: Mutex<Vec<JobId>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl JobRunner for RecordingRunner {
        async fn run(&self, id: JobId) -> anyhow::Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.store
                .update_if_status(&id, &[JobStatus::Queued], &JobPatch::status(JobStatus::Done))
                .await?;
            self.ran.lock().unwrap().push(id);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        store: MemoryStore,
        runner: Arc<RecordingRunner>,
        manager: QueueStateManager,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let stores = Stores::memory(store.clone());
        let runner = Arc::new(RecordingRunner {
            store: store.clone(),
            ran: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let gate = Arc::new(PlanEntitlementGate::new(stores.plans.clone(), stores.jobs.clone()));
        let manager = QueueStateManager::new(stores, gate, runner.clone());
        Fixture { store, runner, manager }
    }

    async fn queue_with_drafts(fx: &Fixture, n: usize) -> Queue {
        let queue = fx
            .manager
            .create_queue("u1", "Batch", Some("p1"), None)
            .await
            .unwrap();
        for _ in 0..n {
            fx.manager
                .create_draft_job("u1", &queue.id, JobCreateRequest::from_url("https://example.com/a.mp4"))
                .await
                .unwrap();
        }
        queue
    }

    async fn statuses(store: &MemoryStore, queue_id: &str) -> Vec<JobStatus> {
        store
            .queue_jobs(queue_id, None)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.status)
            .collect()
    }

    #[tokio::test]
    async fn test_draft_positions_increase_from_zero() {
        let fx = fixture();
        let queue = queue_with_drafts(&fx, 3).await;
        let jobs = fx.store.queue_jobs(&queue.id, None).await.unwrap();
        let positions: Vec<_> = jobs.iter().map(|j| j.queue_position).collect();
        assert_eq!(positions, vec![Some(0), Some(1), Some(2)]);
        assert!(jobs.iter().all(|j| j.project_id.as_deref() == Some("p1")));
        assert!(jobs.iter().all(|j| j.status == JobStatus::Draft));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_drafts_get_distinct_positions() {
        let fx = fixture();
        let queue = queue_with_drafts(&fx, 0).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = fx.manager.clone();
            let queue_id = queue.id.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .create_draft_job("u1", &queue_id, JobCreateRequest::from_url("https://example.com/a.mp4"))
                    .await
                    .unwrap()
                    .queue_position
            }));
        }
        let mut positions = Vec::new();
        for handle in handles {
            positions.push(handle.await.unwrap().unwrap());
        }
        positions.sort_unstable();
        assert_eq!(positions, (0..8).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn test_draft_requires_queue_project() {
        let fx = fixture();
        let queue = fx.manager.create_queue("u1", "Loose", None, None).await.unwrap();
        let err = fx
            .manager
            .create_draft_job("u1", &queue.id, JobCreateRequest::from_url("https://example.com/a.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));
    }

    #[tokio::test]
    async fn test_default_queue_is_reused() {
        let fx = fixture();
        let first = fx.manager.get_or_create_default_queue("u1", Some("p1")).await.unwrap();
        let second = fx.manager.get_or_create_default_queue("u1", Some("p1")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, DEFAULT_QUEUE_NAME);
    }

    #[tokio::test]
    async fn test_other_owner_cannot_see_queue() {
        let fx = fixture();
        let queue = queue_with_drafts(&fx, 1).await;
        let err = fx.manager.pause_queue("intruder", &queue.id).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_pause_reverts_queued_and_leaves_running() {
        let fx = fixture();
        let queue = queue_with_drafts(&fx, 6).await;
        let jobs = fx.store.queue_jobs(&queue.id, None).await.unwrap();
        for (i, job) in jobs.iter().enumerate() {
            let status = if i < 4 { JobStatus::Queued } else { JobStatus::Stt };
            JobStore::update(&fx.store, &job.id, &JobPatch::status(status)).await.unwrap();
        }

        let outcome = fx.manager.pause_queue("u1", &queue.id).await.unwrap();
        assert_eq!(outcome.jobs_reverted, 4);

        let after = statuses(&fx.store, &queue.id).await;
        assert_eq!(after.iter().filter(|s| **s == JobStatus::Draft).count(), 4);
        assert_eq!(after.iter().filter(|s| **s == JobStatus::Stt).count(), 2);

        let stored = QueueStore::get(&fx.store, &queue.id).await.unwrap().unwrap();
        assert!(stored.is_paused());
    }

    #[tokio::test]
    async fn test_resume_without_drafts_is_validation_error() {
        let fx = fixture();
        let queue = queue_with_drafts(&fx, 0).await;
        let err = fx.manager.resume_queue("u1", &queue.id).await.unwrap_err();
        assert!(matches!(err, QueueError::Validation(ref m) if m == "No draft jobs to resume"));
    }

    #[tokio::test]
    async fn test_resume_denied_leaves_all_drafts() {
        let fx = fixture();
        let queue = queue_with_drafts(&fx, 3).await;
        fx.manager.pause_queue("u1", &queue.id).await.unwrap();
        // Free plan allows 10 per month; 3 drafts plus 8 more exceed it
        for _ in 0..8 {
            JobStore::insert(&fx.store, &Job::from_url("u1", "https://example.com/b.mp4"))
                .await
                .unwrap();
        }

        let err = fx.manager.resume_queue("u1", &queue.id).await.unwrap_err();
        match err {
            QueueError::Entitlement { reason, plan, current_usage } => {
                assert_eq!(plan, PlanTier::Free);
                assert_eq!(current_usage, Some(11));
                assert!(reason.starts_with("Monthly limit reached"));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(statuses(&fx.store, &queue.id).await.iter().all(|s| *s == JobStatus::Draft));
        let stored = QueueStore::get(&fx.store, &queue.id).await.unwrap().unwrap();
        assert!(stored.is_paused());
        assert!(fx.runner.ran.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_runs_every_draft_within_plan_concurrency() {
        let fx = fixture();
        fx.store.set_plan("u1", PlanTier::Pro).await;
        let queue = queue_with_drafts(&fx, 7).await;
        let expected: Vec<JobId> = fx
            .store
            .queue_jobs(&queue.id, None)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();

        let (outcome, batch) = fx.manager.resume_queue_tracked("u1", &queue.id).await.unwrap();
        assert_eq!(outcome.count, 7);
        assert_eq!(outcome.concurrency, 3);
        assert_eq!(outcome.plan, PlanTier::Pro);

        let report = batch.await.unwrap();
        assert_eq!(report, BatchReport { succeeded: 7, failed: 0 });
        assert!(fx.runner.peak.load(Ordering::SeqCst) <= 3);

        let mut ran = fx.runner.ran.lock().unwrap().clone();
        ran.sort();
        let mut expected = expected;
        expected.sort();
        assert_eq!(ran, expected);
        assert!(statuses(&fx.store, &queue.id).await.iter().all(|s| *s == JobStatus::Done));
    }

    #[tokio::test]
    async fn test_queue_cap_lowers_concurrency() {
        let fx = fixture();
        fx.store.set_plan("u1", PlanTier::Enterprise).await;
        let queue = fx
            .manager
            .create_queue("u1", "Capped", Some("p1"), Some(2))
            .await
            .unwrap();
        fx.manager
            .create_draft_job("u1", &queue.id, JobCreateRequest::from_url("https://example.com/a.mp4"))
            .await
            .unwrap();

        let (outcome, batch) = fx.manager.resume_queue_tracked("u1", &queue.id).await.unwrap();
        assert_eq!(outcome.concurrency, 2);
        batch.await.unwrap();
    }
}
