//! Firestore-backed job records.
//!
//! Conditional writes read the document, check its status and write back
//! with the read `updateTime` as precondition. A concurrent writer makes the
//! precondition fail and the read-check-write cycle is repeated.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use capflow_models::{Job, JobFilter, JobId, JobPage, JobPatch, JobStatus, Queue, StatusCounts};

use crate::client::FirestoreClient;
use crate::convert::{from_document, masked, to_fields};
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_cas_conflict;
use crate::queue_repo::COLLECTION as QUEUES;
use crate::store::{JobStore, Transition};
use crate::types::{ArrayValue, Document, DocumentMask, Filter, Order, Precondition, StructuredQuery, Value, Write};

const COLLECTION: &str = "jobs";

/// Read-check-write cycles before giving up under contention.
const MAX_CAS_ATTEMPTS: u32 = 5;

/// Documents fetched per request; listings page until exhausted.
pub(crate) const QUERY_PAGE_SIZE: i32 = 300;

/// Repository for job documents.
#[derive(Clone)]
pub struct JobRepository {
    client: FirestoreClient,
}

impl JobRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Job plus the update time to use as write precondition.
    async fn load(&self, id: &JobId) -> FirestoreResult<Option<(Job, Option<String>)>> {
        let doc = self
            .client
            .with_retry("get_job", || self.client.get_document(COLLECTION, id.as_str()))
            .await?;
        match doc {
            Some(doc) => Ok(Some((from_document(&doc)?, doc.update_time))),
            None => Ok(None),
        }
    }

    async fn query(&self, filters: Vec<Filter>, order: Option<Order>) -> FirestoreResult<Vec<Job>> {
        let mut query = StructuredQuery::collection(COLLECTION).filter(filters);
        if let Some(order) = order {
            query = query.order_by(order);
        }
        let docs = self.client.run_query_paged("", query, QUERY_PAGE_SIZE).await?;
        Ok(decode_all(&docs))
    }

    /// Position after the queue's last job, 0 for an empty queue.
    async fn after_last_position(&self, queue_id: &str) -> FirestoreResult<u32> {
        let query = StructuredQuery::collection(COLLECTION)
            .filter(vec![Filter::equal("queueId", Value::string(queue_id))])
            .order_by(Order::desc("queuePosition"))
            .limit(1);
        let docs = self
            .client
            .with_retry("last_queue_job", || self.client.run_query("", query.clone()))
            .await?;
        Ok(decode_all(&docs)
            .first()
            .and_then(|job| job.queue_position)
            .map_or(0, |p| p + 1))
    }
}

fn decode_all(docs: &[Document]) -> Vec<Job> {
    docs.iter()
        .filter_map(|doc| match from_document::<Job>(doc) {
            Ok(job) => Some(job),
            Err(e) => {
                warn!(doc = doc.id().unwrap_or(""), error = %e, "Failed to parse job document");
                None
            }
        })
        .collect()
}

fn timestamp(ts: DateTime<Utc>) -> Value {
    Value::TimestampValue(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn status_filter(statuses: &[JobStatus]) -> Filter {
    match statuses {
        [single] => Filter::equal("status", Value::string(single.as_str())),
        many => Filter::field(
            "status",
            "IN",
            Value::ArrayValue(ArrayValue {
                values: Some(many.iter().map(|s| Value::string(s.as_str())).collect()),
            }),
        ),
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn insert(&self, job: &Job) -> FirestoreResult<()> {
        self.client
            .create_document(COLLECTION, job.id.as_str(), to_fields(job)?)
            .await?;
        debug!(job_id = %job.id, "Created job record");
        Ok(())
    }

    async fn get(&self, id: &JobId) -> FirestoreResult<Option<Job>> {
        Ok(self.load(id).await?.map(|(job, _)| job))
    }

    async fn insert_draft(&self, job: Job, queue_id: &str) -> FirestoreResult<Job> {
        let queue_paths = ["nextPosition", "updatedAt"];

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let doc = self
                .client
                .with_retry("get_queue", || self.client.get_document(QUEUES, queue_id))
                .await?
                .ok_or_else(|| FirestoreError::NotFound(format!("{}/{}", QUEUES, queue_id)))?;
            let mut queue: Queue = from_document(&doc)?;

            let position = queue.next_position.max(self.after_last_position(queue_id).await?);
            let draft = job.clone().as_draft_in(queue_id, position);
            queue.next_position = position + 1;
            queue.updated_at = Utc::now();

            // Counter bump and insert land together or not at all
            let writes = vec![
                Write {
                    update: Some(Document {
                        name: Some(self.client.full_document_name(QUEUES, queue_id)),
                        fields: Some(masked(to_fields(&queue)?, &queue_paths)),
                        ..Default::default()
                    }),
                    delete: None,
                    update_mask: Some(DocumentMask {
                        field_paths: queue_paths.iter().map(|p| p.to_string()).collect(),
                    }),
                    current_document: Some(Precondition {
                        exists: None,
                        update_time: doc.update_time.clone(),
                    }),
                },
                Write {
                    update: Some(Document {
                        name: Some(self.client.full_document_name(COLLECTION, draft.id.as_str())),
                        fields: Some(to_fields(&draft)?),
                        ..Default::default()
                    }),
                    delete: None,
                    update_mask: None,
                    current_document: Some(Precondition {
                        exists: Some(false),
                        update_time: None,
                    }),
                },
            ];

            match self.client.commit(writes).await {
                Ok(_) => {
                    debug!(job_id = %draft.id, queue_id, position, "Created draft job");
                    return Ok(draft);
                }
                Err(e) if e.is_precondition_failed() => {
                    record_cas_conflict(QUEUES);
                    debug!(queue_id, attempt, "Queue position taken concurrently, re-reading");
                }
                Err(e) => return Err(e),
            }
        }

        Err(FirestoreError::PreconditionFailed(format!(
            "{}/{}: position still contended after {} attempts",
            QUEUES, queue_id, MAX_CAS_ATTEMPTS
        )))
    }

    async fn update_if_status(
        &self,
        id: &JobId,
        expected: &[JobStatus],
        patch: &JobPatch,
    ) -> FirestoreResult<Transition<Job>> {
        let paths = patch.field_paths();

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let Some((mut job, update_time)) = self.load(id).await? else {
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

            patch.apply(&mut job, Utc::now());
            let fields = masked(to_fields(&job)?, &paths);

            match self
                .client
                .update_document(COLLECTION, id.as_str(), fields, Some(paths.as_slice()), update_time.as_deref())
                .await
            {
                Ok(_) => return Ok(Transition::Applied(job)),
                Err(e) if e.is_precondition_failed() => {
                    record_cas_conflict(COLLECTION);
                    debug!(job_id = %id, attempt, "Job changed concurrently, re-reading");
                }
                Err(FirestoreError::NotFound(_)) => {
                    return Ok(Transition::Conflict {
                        id: id.clone(),
                        current: None,
                    })
                }
                Err(e) => return Err(e),
            }
        }

        Err(FirestoreError::PreconditionFailed(format!(
            "jobs/{}: still contended after {} attempts",
            id, MAX_CAS_ATTEMPTS
        )))
    }

    async fn update_all_if_status(
        &self,
        ids: &[JobId],
        expected: &[JobStatus],
        patch: &JobPatch,
    ) -> FirestoreResult<Transition<Vec<Job>>> {
        let paths = patch.field_paths();

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let now = Utc::now();
            let mut updated = Vec::with_capacity(ids.len());
            let mut writes = Vec::with_capacity(ids.len());

            for id in ids {
                let loaded = self.load(id).await?;
                let current = loaded.as_ref().map(|(job, _)| job.status);
                let Some((mut job, update_time)) = loaded.filter(|(job, _)| expected.contains(&job.status)) else {
                    return Ok(Transition::Conflict { id: id.clone(), current });
                };

                patch.apply(&mut job, now);
                writes.push(Write {
                    update: Some(Document {
                        name: Some(self.client.full_document_name(COLLECTION, id.as_str())),
                        fields: Some(masked(to_fields(&job)?, &paths)),
                        ..Default::default()
                    }),
                    delete: None,
                    update_mask: Some(DocumentMask {
                        field_paths: paths.iter().map(|p| p.to_string()).collect(),
                    }),
                    current_document: Some(Precondition {
                        exists: None,
                        update_time,
                    }),
                });
                updated.push(job);
            }

            match self.client.commit(writes).await {
                Ok(_) => return Ok(Transition::Applied(updated)),
                Err(e) if e.is_precondition_failed() => {
                    record_cas_conflict(COLLECTION);
                    debug!(count = ids.len(), attempt, "Jobs changed concurrently, re-reading");
                }
                Err(e) => return Err(e),
            }
        }

        Err(FirestoreError::PreconditionFailed(format!(
            "{} jobs still contended after {} attempts",
            ids.len(),
            MAX_CAS_ATTEMPTS
        )))
    }

    async fn delete(&self, id: &JobId) -> FirestoreResult<bool> {
        self.client.delete_document(COLLECTION, id.as_str()).await
    }

    async fn list(&self, filter: &JobFilter) -> FirestoreResult<JobPage> {
        let mut filters = Vec::new();
        if let Some(owner) = &filter.owner_id {
            filters.push(Filter::equal("ownerId", Value::string(owner)));
        }
        if let Some(status) = &filter.status {
            filters.push(status_filter(&status.statuses()));
        }
        if let Some(project) = &filter.project_id {
            filters.push(Filter::equal("projectId", Value::string(project)));
        }
        if let Some(queue) = &filter.queue_id {
            filters.push(Filter::equal("queueId", Value::string(queue)));
        }

        // Search and date range are applied in paginate
        let jobs = self.query(filters, Some(Order::desc("createdAt"))).await?;
        Ok(filter.paginate(jobs))
    }

    async fn count_by_status(&self, owner_id: &str) -> FirestoreResult<StatusCounts> {
        let jobs = self
            .query(vec![Filter::equal("ownerId", Value::string(owner_id))], None)
            .await?;
        let mut counts = StatusCounts::new();
        for job in jobs {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn queue_jobs(&self, queue_id: &str, status: Option<JobStatus>) -> FirestoreResult<Vec<Job>> {
        let mut filters = vec![Filter::equal("queueId", Value::string(queue_id))];
        if let Some(status) = status {
            filters.push(status_filter(&[status]));
        }
        self.query(filters, Some(Order::asc("queuePosition"))).await
    }

    async fn count_created_since(&self, owner_id: &str, since: DateTime<Utc>) -> FirestoreResult<u64> {
        let jobs = self
            .query(
                vec![
                    Filter::equal("ownerId", Value::string(owner_id)),
                    Filter::field("createdAt", "GREATER_THAN_OR_EQUAL", timestamp(since)),
                ],
                Some(Order::asc("createdAt")),
            )
            .await?;
        Ok(jobs.len() as u64)
    }

    async fn stale(&self, statuses: &[JobStatus], updated_before: DateTime<Utc>) -> FirestoreResult<Vec<Job>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        self.query(
            vec![
                status_filter(statuses),
                Filter::field("updatedAt", "LESS_THAN", timestamp(updated_before)),
            ],
            Some(Order::asc("updatedAt")),
        )
        .await
    }
}
