//! Firestore-backed queues.

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use capflow_models::{Queue, QueueStatus};

use crate::client::FirestoreClient;
use crate::convert::{from_document, to_fields};
use crate::error::{FirestoreError, FirestoreResult};
use crate::store::QueueStore;
use crate::types::{Filter, StructuredQuery, Value};

pub(crate) const COLLECTION: &str = "queues";

/// Repository for queue documents.
#[derive(Clone)]
pub struct QueueRepository {
    client: FirestoreClient,
}

impl QueueRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueueStore for QueueRepository {
    async fn insert(&self, queue: &Queue) -> FirestoreResult<()> {
        self.client
            .create_document(COLLECTION, &queue.id, to_fields(queue)?)
            .await?;
        info!(queue_id = %queue.id, owner_id = %queue.owner_id, "Created queue");
        Ok(())
    }

    async fn get(&self, id: &str) -> FirestoreResult<Option<Queue>> {
        let doc = self
            .client
            .with_retry("get_queue", || self.client.get_document(COLLECTION, id))
            .await?;
        doc.as_ref().map(from_document::<Queue>).transpose()
    }

    async fn set_status(&self, id: &str, status: QueueStatus) -> FirestoreResult<Option<Queue>> {
        let Some(mut queue) = self.get(id).await? else {
            return Ok(None);
        };
        queue.status = status;
        queue.updated_at = Utc::now();

        let mask = ["status", "updatedAt"];
        let fields = crate::convert::masked(to_fields(&queue)?, &mask);
        match self.client.update_document(COLLECTION, id, fields, Some(&mask[..]), None).await {
            Ok(_) => Ok(Some(queue)),
            Err(FirestoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_by_name(
        &self,
        owner_id: &str,
        project_id: Option<&str>,
        name: &str,
    ) -> FirestoreResult<Option<Queue>> {
        let query = StructuredQuery::collection(COLLECTION)
            .filter(vec![
                Filter::equal("ownerId", Value::string(owner_id)),
                Filter::equal("name", Value::string(name)),
            ])
            .limit(50);

        let docs = self
            .client
            .with_retry("find_queue", || self.client.run_query("", query.clone()))
            .await?;

        // Equality on null needs a unary filter; match the project here instead
        let queues = docs.iter().map(from_document::<Queue>).collect::<FirestoreResult<Vec<_>>>()?;
        Ok(queues
            .into_iter()
            .filter(|q| q.project_id.as_deref() == project_id)
            .min_by_key(|q| q.created_at))
    }
}
