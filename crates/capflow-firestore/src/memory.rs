//! In-memory store for tests and local runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use capflow_models::{
    Job, JobFilter, JobId, JobPage, JobPatch, JobStatus, MediaCacheEntry, MediaCacheKind, PlanTier, Queue,
    QueueStatus, StatusCounts, WebhookSubscription,
};

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{JobStore, MediaCacheStore, PlanStore, QueueStore, Transition, WebhookStore};

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    queues: HashMap<String, Queue>,
    media_cache: HashMap<String, MediaCacheEntry>,
    plans: HashMap<String, PlanTier>,
    webhooks: Vec<WebhookSubscription>,
}

/// Every store contract over process memory. Writes are serialized by one lock.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_plan(&self, owner_id: &str, plan: PlanTier) {
        self.inner.write().await.plans.insert(owner_id.to_string(), plan);
    }

    pub async fn add_webhook(&self, subscription: WebhookSubscription) {
        self.inner.write().await.webhooks.push(subscription);
    }

    /// Snapshot of every job.
    pub async fn jobs(&self) -> Vec<Job> {
        self.inner.read().await.jobs.values().cloned().collect()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert(&self, job: &Job) -> FirestoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(&job.id) {
            return Err(FirestoreError::AlreadyExists(format!("jobs/{}", job.id)));
        }
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> FirestoreResult<Option<Job>> {
        Ok(self.inner.read().await.jobs.get(id).cloned())
    }

    async fn insert_draft(&self, job: Job, queue_id: &str) -> FirestoreResult<Job> {
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(&job.id) {
            return Err(FirestoreError::AlreadyExists(format!("jobs/{}", job.id)));
        }
        let after_last = inner
            .jobs
            .values()
            .filter(|j| j.queue_id.as_deref() == Some(queue_id))
            .filter_map(|j| j.queue_position)
            .max()
            .map_or(0, |p| p + 1);
        let queue = inner
            .queues
            .get_mut(queue_id)
            .ok_or_else(|| FirestoreError::NotFound(format!("queues/{}", queue_id)))?;

        let position = queue.next_position.max(after_last);
        queue.next_position = position + 1;
        queue.updated_at = Utc::now();

        let job = job.as_draft_in(queue_id, position);
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn update_if_status(
        &self,
        id: &JobId,
        expected: &[JobStatus],
        patch: &JobPatch,
    ) -> FirestoreResult<Transition<Job>> {
        let mut inner = self.inner.write().await;
        let Some(job) = inner.jobs.get_mut(id) else {
            return Ok(Transition::Conflict {
                id: id.clone(),
                current: None,
            });
        };
        if !expected.contains(&job.status) {
            return Ok(Transition::Conflict {
                id: id.clone(),
                current: Some(job.status),
            });
        }
        patch.apply(job, Utc::now());
        Ok(Transition::Applied(job.clone()))
    }

    async fn update_all_if_status(
        &self,
        ids: &[JobId],
        expected: &[JobStatus],
        patch: &JobPatch,
    ) -> FirestoreResult<Transition<Vec<Job>>> {
        let mut inner = self.inner.write().await;
        for id in ids {
            let current = inner.jobs.get(id).map(|j| j.status);
            if !current.is_some_and(|s| expected.contains(&s)) {
                return Ok(Transition::Conflict { id: id.clone(), current });
            }
        }

        let now = Utc::now();
        let mut updated = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = inner.jobs.get_mut(id) {
                patch.apply(job, now);
                updated.push(job.clone());
            }
        }
        Ok(Transition::Applied(updated))
    }

    async fn delete(&self, id: &JobId) -> FirestoreResult<bool> {
        Ok(self.inner.write().await.jobs.remove(id).is_some())
    }

    async fn list(&self, filter: &JobFilter) -> FirestoreResult<JobPage> {
        let jobs = self.inner.read().await.jobs.values().cloned().collect();
        Ok(filter.paginate(jobs))
    }

    async fn count_by_status(&self, owner_id: &str) -> FirestoreResult<StatusCounts> {
        let mut counts = StatusCounts::new();
        for job in self.inner.read().await.jobs.values().filter(|j| j.owner_id == owner_id) {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn queue_jobs(&self, queue_id: &str, status: Option<JobStatus>) -> FirestoreResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .inner
            .read()
            .await
            .jobs
            .values()
            .filter(|j| j.queue_id.as_deref() == Some(queue_id))
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.queue_position, j.created_at));
        Ok(jobs)
    }

    async fn count_created_since(&self, owner_id: &str, since: DateTime<Utc>) -> FirestoreResult<u64> {
        Ok(self
            .inner
            .read()
            .await
            .jobs
            .values()
            .filter(|j| j.owner_id == owner_id && j.created_at >= since)
            .count() as u64)
    }

    async fn stale(&self, statuses: &[JobStatus], updated_before: DateTime<Utc>) -> FirestoreResult<Vec<Job>> {
        Ok(self
            .inner
            .read()
            .await
            .jobs
            .values()
            .filter(|j| statuses.contains(&j.status) && j.updated_at < updated_before)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn insert(&self, queue: &Queue) -> FirestoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.queues.contains_key(&queue.id) {
            return Err(FirestoreError::AlreadyExists(format!("queues/{}", queue.id)));
        }
        inner.queues.insert(queue.id.clone(), queue.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> FirestoreResult<Option<Queue>> {
        Ok(self.inner.read().await.queues.get(id).cloned())
    }

    async fn set_status(&self, id: &str, status: QueueStatus) -> FirestoreResult<Option<Queue>> {
        let mut inner = self.inner.write().await;
        Ok(inner.queues.get_mut(id).map(|queue| {
            queue.status = status;
            queue.updated_at = Utc::now();
            queue.clone()
        }))
    }

    async fn find_by_name(
        &self,
        owner_id: &str,
        project_id: Option<&str>,
        name: &str,
    ) -> FirestoreResult<Option<Queue>> {
        Ok(self
            .inner
            .read()
            .await
            .queues
            .values()
            .filter(|q| q.owner_id == owner_id && q.project_id.as_deref() == project_id && q.name == name)
            .min_by_key(|q| q.created_at)
            .cloned())
    }
}

#[async_trait]
impl MediaCacheStore for MemoryStore {
    async fn get(&self, kind: MediaCacheKind, hash: &str) -> FirestoreResult<Option<MediaCacheEntry>> {
        let key = MediaCacheEntry::document_id(kind, hash);
        Ok(self.inner.read().await.media_cache.get(&key).cloned())
    }

    async fn upsert(&self, entry: &MediaCacheEntry) -> FirestoreResult<()> {
        let key = MediaCacheEntry::document_id(entry.kind, &entry.hash);
        self.inner.write().await.media_cache.insert(key, entry.clone());
        Ok(())
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn plan_for(&self, owner_id: &str) -> FirestoreResult<PlanTier> {
        Ok(self
            .inner
            .read()
            .await
            .plans
            .get(owner_id)
            .copied()
            .unwrap_or_default())
    }
}

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn subscriptions_for(&self, owner_id: &str) -> FirestoreResult<Vec<WebhookSubscription>> {
        Ok(self
            .inner
            .read()
            .await
            .webhooks
            .iter()
            .filter(|w| w.owner_id == owner_id && w.is_active)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(owner: &str) -> Job {
        Job::from_url(owner, "https://example.com/a.mp4")
    }

    #[tokio::test]
    async fn test_update_if_status_rejects_unexpected_status() {
        let store = MemoryStore::new();
        let j = job("u1").with_status(JobStatus::Canceled);
        JobStore::insert(&store, &j).await.unwrap();

        let outcome = store
            .update_if_status(
                &j.id,
                &[JobStatus::Downloading],
                &JobPatch::stage(JobStatus::Stt, capflow_models::JobStep::Transcribe, 0.3),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Transition::Conflict {
                id: j.id.clone(),
                current: Some(JobStatus::Canceled)
            }
        );
        let stored = JobStore::get(&store, &j.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Canceled);
    }

    #[tokio::test]
    async fn test_update_all_is_all_or_nothing() {
        let store = MemoryStore::new();
        let a = job("u1").as_draft_in("q1", 0);
        let b = job("u1").as_draft_in("q1", 1).with_status(JobStatus::Queued);
        JobStore::insert(&store, &a).await.unwrap();
        JobStore::insert(&store, &b).await.unwrap();

        let patch = JobPatch::status(JobStatus::Queued);
        let outcome = store
            .update_all_if_status(&[a.id.clone(), b.id.clone()], &[JobStatus::Draft], &patch)
            .await
            .unwrap();
        assert!(!outcome.is_applied());
        let a_now = JobStore::get(&store, &a.id).await.unwrap().unwrap();
        assert_eq!(a_now.status, JobStatus::Draft);
    }

    #[tokio::test]
    async fn test_queue_jobs_are_ordered_by_position() {
        let store = MemoryStore::new();
        for pos in [2u32, 0, 1] {
            JobStore::insert(&store, &job("u1").as_draft_in("q1", pos)).await.unwrap();
        }
        JobStore::insert(&store, &job("u1").as_draft_in("q2", 0)).await.unwrap();

        let jobs = store.queue_jobs("q1", Some(JobStatus::Draft)).await.unwrap();
        let positions: Vec<_> = jobs.iter().map(|j| j.queue_position).collect();
        assert_eq!(positions, vec![Some(0), Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn test_insert_draft_claims_next_position() {
        let store = MemoryStore::new();
        let queue = Queue::new("u1", "batch");
        QueueStore::insert(&store, &queue).await.unwrap();
        JobStore::insert(&store, &job("u1").as_draft_in(&queue.id, 4)).await.unwrap();

        let first = store.insert_draft(job("u1"), &queue.id).await.unwrap();
        let second = store.insert_draft(job("u1"), &queue.id).await.unwrap();
        assert_eq!(first.queue_position, Some(5));
        assert_eq!(second.queue_position, Some(6));
        assert_eq!(second.status, JobStatus::Draft);

        let stored = QueueStore::get(&store, &queue.id).await.unwrap().unwrap();
        assert_eq!(stored.next_position, 7);
        assert!(matches!(
            store.insert_draft(job("u1"), "missing").await,
            Err(FirestoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_count_by_status_is_per_owner() {
        let store = MemoryStore::new();
        JobStore::insert(&store, &job("u1")).await.unwrap();
        JobStore::insert(&store, &job("u1").with_status(JobStatus::Done)).await.unwrap();
        JobStore::insert(&store, &job("u2")).await.unwrap();

        let counts = store.count_by_status("u1").await.unwrap();
        assert_eq!(counts.get(&JobStatus::Pending), Some(&1));
        assert_eq!(counts.get(&JobStatus::Done), Some(&1));
    }

    #[tokio::test]
    async fn test_plan_defaults_to_free() {
        let store = MemoryStore::new();
        assert_eq!(store.plan_for("u1").await.unwrap(), PlanTier::Free);
        store.set_plan("u1", PlanTier::Pro).await;
        assert_eq!(store.plan_for("u1").await.unwrap(), PlanTier::Pro);
    }

    #[tokio::test]
    async fn test_media_cache_upsert_is_last_write_wins() {
        let store = MemoryStore::new();
        let entry = MediaCacheEntry::new(MediaCacheKind::TrimmedAudio, "abc", "cache/trimmed/abc.mp3");
        store.upsert(&entry).await.unwrap();
        store.upsert(&entry.clone().with_size(Some(42))).await.unwrap();

        let stored = MediaCacheStore::get(&store, MediaCacheKind::TrimmedAudio, "abc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.size_bytes, Some(42));
        assert!(MediaCacheStore::get(&store, MediaCacheKind::SequenceVideo, "abc")
            .await
            .unwrap()
            .is_none());
    }
}
