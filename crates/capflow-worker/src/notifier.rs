//! Webhook notifications for job lifecycle events.
//!
//! Delivery is best effort: every failure is logged and counted, never
//! returned to the pipeline.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, warn};
use uuid::Uuid;

use capflow_firestore::WebhookStore;
use capflow_models::{WebhookEvent, WebhookSubscription};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics::record_webhook_delivery;

type HmacSha256 = Hmac<Sha256>;

/// Fire-and-forget event trigger.
pub trait Notifier: Send + Sync {
    fn trigger(&self, owner_id: &str, event: WebhookEvent, data: serde_json::Value);
}

#[derive(Serialize)]
struct Envelope<'a> {
    id: String,
    event: &'a str,
    timestamp: String,
    data: &'a serde_json::Value,
}

/// Hex HMAC-SHA256 over `"{timestamp}.{body}"`.
pub fn sign_payload(body: &str, secret: &str, timestamp: &str) -> WorkerResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WorkerError::Notification(format!("Invalid HMAC key: {}", e)))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[derive(Clone)]
pub struct WebhookNotifier {
    subscriptions: Arc<dyn WebhookStore>,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(subscriptions: Arc<dyn WebhookStore>, timeout: Duration) -> WorkerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("capflow-webhook/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WorkerError::config_error(format!("Failed to build webhook client: {}", e)))?;
        Ok(Self { subscriptions, client })
    }

    /// Deliver `event` to every matching subscription; returns successful deliveries.
    pub async fn deliver(&self, owner_id: &str, event: WebhookEvent, data: &serde_json::Value) -> usize {
        let subscriptions = match self.subscriptions.subscriptions_for(owner_id).await {
            Ok(subs) => subs,
            Err(e) => {
                warn!(owner_id = %owner_id, event = event.as_str(), error = %e, "Failed to load webhook subscriptions");
                return 0;
            }
        };

        let targets: Vec<&WebhookSubscription> = subscriptions.iter().filter(|s| s.wants(event)).collect();
        if targets.is_empty() {
            return 0;
        }

        let results = join_all(targets.iter().map(|sub| self.send(sub, event, data))).await;
        let delivered = results.iter().filter(|ok| **ok).count();
        debug!(owner_id = %owner_id, event = event.as_str(), delivered, total = targets.len(), "Webhooks delivered");
        delivered
    }

    async fn send(&self, subscription: &WebhookSubscription, event: WebhookEvent, data: &serde_json::Value) -> bool {
        let result = self.try_send(subscription, event, data).await;
        if let Err(e) = &result {
            warn!(webhook_id = %subscription.id, url = %subscription.url, error = %e, "Webhook delivery failed");
        }
        record_webhook_delivery(result.is_ok());
        result.is_ok()
    }

    async fn try_send(
        &self,
        subscription: &WebhookSubscription,
        event: WebhookEvent,
        data: &serde_json::Value,
    ) -> WorkerResult<()> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let body = serde_json::to_string(&Envelope {
            id: Uuid::new_v4().to_string(),
            event: event.as_str(),
            timestamp: timestamp.clone(),
            data,
        })
        .map_err(|e| WorkerError::Notification(e.to_string()))?;
        let signature = sign_payload(&body, &subscription.secret, &timestamp)?;

        let response = self
            .client
            .post(&subscription.url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Event", event.as_str())
            .header("X-Webhook-Timestamp", &timestamp)
            .header("X-Webhook-Signature", signature)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WorkerError::Notification(format!(
                "{} responded {}",
                subscription.url,
                response.status()
            )));
        }
        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    fn trigger(&self, owner_id: &str, event: WebhookEvent, data: serde_json::Value) {
        let notifier = self.clone();
        let owner_id = owner_id.to_string();
        tokio::spawn(async move {
            notifier.deliver(&owner_id, event, &data).await;
        });
    }
}

/// Notifier that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn trigger(&self, _owner_id: &str, _event: WebhookEvent, _data: serde_json::Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use capflow_firestore::MemoryStore;
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn subscription(url: String, events: &[&str]) -> WebhookSubscription {
        WebhookSubscription {
            id: Uuid::new_v4().to_string(),
            owner_id: "u1".into(),
            url,
            secret: "s3cret".into(),
            events: events.iter().map(|e| e.to_string()).collect(),
            is_active: true,
        }
    }

    #[test]
    fn test_signature_is_hex_hmac_of_timestamp_and_body() {
        let sig = sign_payload("{}", "key", "1700000000000").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));

        let mut mac = HmacSha256::new_from_slice(b"key").unwrap();
        mac.update(b"1700000000000.{}");
        assert_eq!(sig, hex::encode(mac.finalize().into_bytes()));
    }

    #[tokio::test]
    async fn test_delivers_signed_event_to_matching_subscriptions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("X-Webhook-Event", "job.completed"))
            .and(header_exists("X-Webhook-Signature"))
            .and(header_exists("X-Webhook-Timestamp"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        store
            .add_webhook(subscription(format!("{}/hook", server.uri()), &["job.completed"]))
            .await;
        store
            .add_webhook(subscription(format!("{}/other", server.uri()), &["job.failed"]))
            .await;

        let notifier = WebhookNotifier::new(Arc::new(store), Duration::from_secs(5)).unwrap();
        let delivered = notifier
            .deliver("u1", WebhookEvent::JobCompleted, &json!({ "jobId": "j1" }))
            .await;
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        store
            .add_webhook(subscription(format!("{}/hook", server.uri()), &["job.failed"]))
            .await;

        let notifier = WebhookNotifier::new(Arc::new(store), Duration::from_secs(5)).unwrap();
        let delivered = notifier
            .deliver("u1", WebhookEvent::JobFailed, &json!({ "error": "boom" }))
            .await;
        assert_eq!(delivered, 0);
    }
}
