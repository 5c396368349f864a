//! Store contracts shared by the services.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use capflow_models::{
    Job, JobFilter, JobId, JobPage, JobPatch, JobStatus, MediaCacheEntry, MediaCacheKind, PlanTier, Queue,
    QueueStatus, StatusCounts, WebhookSubscription,
};

use crate::error::FirestoreResult;

/// Outcome of a compare-and-set write.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<T> {
    /// The write was applied; carries the stored state afterwards.
    Applied(T),
    /// A record was not in an expected status; nothing was written.
    Conflict {
        id: JobId,
        /// `None` when the record does not exist
        current: Option<JobStatus>,
    },
}

impl<T> Transition<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Transition::Applied(value) => Some(value),
            Transition::Conflict { .. } => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

/// Job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &Job) -> FirestoreResult<()>;

    async fn get(&self, id: &JobId) -> FirestoreResult<Option<Job>>;

    /// Insert `job` as the last draft of `queue_id` and return it with its
    /// position set.
    ///
    /// The position is claimed from the queue's counter in the same atomic
    /// write as the insert; concurrent callers never share a position.
    /// Fails with `NotFound` when the queue does not exist.
    async fn insert_draft(&self, job: Job, queue_id: &str) -> FirestoreResult<Job>;

    /// Apply `patch` only if the job's status is one of `expected`.
    async fn update_if_status(
        &self,
        id: &JobId,
        expected: &[JobStatus],
        patch: &JobPatch,
    ) -> FirestoreResult<Transition<Job>>;

    /// Apply `patch` to every job atomically, only if all are in `expected`.
    async fn update_all_if_status(
        &self,
        ids: &[JobId],
        expected: &[JobStatus],
        patch: &JobPatch,
    ) -> FirestoreResult<Transition<Vec<Job>>>;

    /// Delete a job; false when it did not exist.
    async fn delete(&self, id: &JobId) -> FirestoreResult<bool>;

    /// Filtered page, newest first.
    async fn list(&self, filter: &JobFilter) -> FirestoreResult<JobPage>;

    async fn count_by_status(&self, owner_id: &str) -> FirestoreResult<StatusCounts>;

    /// Jobs of a queue ordered by queue position.
    async fn queue_jobs(&self, queue_id: &str, status: Option<JobStatus>) -> FirestoreResult<Vec<Job>>;

    /// Jobs created by `owner_id` at or after `since`.
    async fn count_created_since(&self, owner_id: &str, since: DateTime<Utc>) -> FirestoreResult<u64>;

    /// Jobs in one of `statuses` not updated since `updated_before`.
    async fn stale(&self, statuses: &[JobStatus], updated_before: DateTime<Utc>) -> FirestoreResult<Vec<Job>>;

    /// Unconditional update; `None` when the job does not exist.
    async fn update(&self, id: &JobId, patch: &JobPatch) -> FirestoreResult<Option<Job>> {
        Ok(self.update_if_status(id, &JobStatus::ALL, patch).await?.applied())
    }
}

/// Queue records.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn insert(&self, queue: &Queue) -> FirestoreResult<()>;

    async fn get(&self, id: &str) -> FirestoreResult<Option<Queue>>;

    /// Set the run state; `None` when the queue does not exist.
    async fn set_status(&self, id: &str, status: QueueStatus) -> FirestoreResult<Option<Queue>>;

    /// Find an owner's queue by name within a project.
    async fn find_by_name(
        &self,
        owner_id: &str,
        project_id: Option<&str>,
        name: &str,
    ) -> FirestoreResult<Option<Queue>>;
}

/// Media cache entries, unique on (kind, hash).
#[async_trait]
pub trait MediaCacheStore: Send + Sync {
    async fn get(&self, kind: MediaCacheKind, hash: &str) -> FirestoreResult<Option<MediaCacheEntry>>;

    /// Insert or replace; last write wins.
    async fn upsert(&self, entry: &MediaCacheEntry) -> FirestoreResult<()>;
}

/// Owner plan lookup.
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn plan_for(&self, owner_id: &str) -> FirestoreResult<PlanTier>;
}

/// Webhook subscriptions.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Active subscriptions of an owner.
    async fn subscriptions_for(&self, owner_id: &str) -> FirestoreResult<Vec<WebhookSubscription>>;
}

/// Handles to every store, shared across services.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobStore>,
    pub queues: Arc<dyn QueueStore>,
    pub media_cache: Arc<dyn MediaCacheStore>,
    pub plans: Arc<dyn PlanStore>,
    pub webhooks: Arc<dyn WebhookStore>,
}

impl Stores {
    /// All stores backed by one in-memory store.
    pub fn memory(store: crate::memory::MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            jobs: store.clone(),
            queues: store.clone(),
            media_cache: store.clone(),
            plans: store.clone(),
            webhooks: store,
        }
    }

    /// All stores backed by Firestore.
    pub fn firestore(client: crate::client::FirestoreClient) -> Self {
        let accounts = Arc::new(crate::account_repo::AccountRepository::new(client.clone()));
        Self {
            jobs: Arc::new(crate::job_repo::JobRepository::new(client.clone())),
            queues: Arc::new(crate::queue_repo::QueueRepository::new(client.clone())),
            media_cache: Arc::new(crate::media_cache_repo::MediaCacheRepository::new(client)),
            plans: accounts.clone(),
            webhooks: accounts,
        }
    }
}
