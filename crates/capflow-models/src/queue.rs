//! Named, ordered job queues.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue identifier.
pub type QueueId = String;

/// Run state of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    #[default]
    Active,
    Paused,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Active => "active",
            QueueStatus::Paused => "paused",
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An ordered collection of draft jobs with its own run state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Queue {
    pub id: QueueId,
    pub owner_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub status: QueueStatus,
    /// Optional cap below the owner's plan concurrency
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Position handed to the next draft added to the queue
    #[serde(default)]
    pub next_position: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Queue {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            project_id: None,
            name: name.into(),
            status: QueueStatus::Active,
            max_concurrency: None,
            next_position: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    pub fn is_paused(&self) -> bool {
        self.status == QueueStatus::Paused
    }

    /// Concurrency for a run: the plan limit, lowered by the queue cap.
    pub fn effective_concurrency(&self, plan_limit: usize) -> usize {
        let limit = match self.max_concurrency {
            Some(cap) => plan_limit.min(cap),
            None => plan_limit,
        };
        limit.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_concurrency() {
        let queue = Queue::new("u1", "Default Queue");
        assert_eq!(queue.effective_concurrency(3), 3);
        assert_eq!(queue.clone().with_max_concurrency(2).effective_concurrency(3), 2);
        assert_eq!(queue.clone().with_max_concurrency(8).effective_concurrency(3), 3);
        assert_eq!(queue.with_max_concurrency(0).effective_concurrency(3), 1);
    }
}
