//! Per-user account data: plan tier and webhook subscriptions.

use async_trait::async_trait;
use tracing::warn;

use capflow_models::{PlanTier, WebhookSubscription};

use crate::client::FirestoreClient;
use crate::convert::from_document;
use crate::error::FirestoreResult;
use crate::store::{PlanStore, WebhookStore};
use crate::types::{Filter, StructuredQuery, Value};

const USERS: &str = "users";
const WEBHOOKS: &str = "webhooks";

/// Reads `users/{uid}` and its `webhooks` subcollection.
#[derive(Clone)]
pub struct AccountRepository {
    client: FirestoreClient,
}

impl AccountRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlanStore for AccountRepository {
    async fn plan_for(&self, owner_id: &str) -> FirestoreResult<PlanTier> {
        let doc = self
            .client
            .with_retry("get_user", || self.client.get_document(USERS, owner_id))
            .await?;
        Ok(doc
            .as_ref()
            .and_then(|d| d.field("plan"))
            .and_then(Value::as_str)
            .map(PlanTier::from_str)
            .unwrap_or_default())
    }
}

#[async_trait]
impl WebhookStore for AccountRepository {
    async fn subscriptions_for(&self, owner_id: &str) -> FirestoreResult<Vec<WebhookSubscription>> {
        let query = StructuredQuery::collection(WEBHOOKS).filter(vec![Filter::equal(
            "isActive",
            Value::BooleanValue(true),
        )]);
        let parent = format!("{}/{}", USERS, owner_id);
        let docs = self.client.run_query(&parent, query).await?;

        Ok(docs
            .iter()
            .filter_map(|doc| {
                let mut fields = doc.fields.clone().unwrap_or_default();
                // Subscriptions omit the id and owner; both come from the path
                fields
                    .entry("id".to_string())
                    .or_insert_with(|| Value::string(doc.id().unwrap_or_default()));
                fields
                    .entry("ownerId".to_string())
                    .or_insert_with(|| Value::string(owner_id));
                let with_ids = crate::types::Document::new(fields);
                match from_document::<WebhookSubscription>(&with_ids) {
                    Ok(sub) => Some(sub),
                    Err(e) => {
                        warn!(owner_id = %owner_id, error = %e, "Skipping malformed webhook subscription");
                        None
                    }
                }
            })
            .collect())
    }
}
