//! Webhook subscriptions and job lifecycle events.

use serde::{Deserialize, Serialize};

/// Lifecycle events emitted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "job.started")]
    JobStarted,
    #[serde(rename = "job.completed")]
    JobCompleted,
    #[serde(rename = "job.failed")]
    JobFailed,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::JobStarted => "job.started",
            WebhookEvent::JobCompleted => "job.completed",
            WebhookEvent::JobFailed => "job.failed",
        }
    }
}

impl std::fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered delivery endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSubscription {
    pub id: String,
    pub owner_id: String,
    pub url: String,
    /// HMAC signing secret
    pub secret: String,
    pub events: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl WebhookSubscription {
    pub fn wants(&self, event: WebhookEvent) -> bool {
        self.is_active && self.events.iter().any(|e| e == event.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wants_filters_event_and_active() {
        let mut sub = WebhookSubscription {
            id: "w1".to_string(),
            owner_id: "u1".to_string(),
            url: "https://hooks.example.com".to_string(),
            secret: "s".to_string(),
            events: vec!["job.completed".to_string()],
            is_active: true,
        };
        assert!(sub.wants(WebhookEvent::JobCompleted));
        assert!(!sub.wants(WebhookEvent::JobFailed));
        sub.is_active = false;
        assert!(!sub.wants(WebhookEvent::JobCompleted));
    }
}
