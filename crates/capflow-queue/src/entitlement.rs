//! Plan-derived entitlements: run concurrency and monthly job quota.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use capflow_firestore::{JobStore, PlanStore};
use capflow_models::PlanTier;

use crate::error::QueueResult;

/// Answer to "may this owner run `count` more jobs".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub plan: PlanTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_usage: Option<u64>,
}

impl BatchDecision {
    pub fn allow(plan: PlanTier) -> Self {
        Self {
            allowed: true,
            reason: None,
            plan,
            current_usage: None,
        }
    }

    pub fn deny(plan: PlanTier, reason: impl Into<String>, current_usage: u64) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            plan,
            current_usage: Some(current_usage),
        }
    }
}

#[async_trait]
pub trait EntitlementGate: Send + Sync {
    /// Jobs one queue run may drive at once on `plan`.
    fn concurrency_limit(&self, plan: PlanTier) -> usize {
        plan.limits().concurrent_jobs
    }

    /// Owner's plan; lookup failures resolve to the most restrictive tier.
    async fn plan_for(&self, owner_id: &str) -> PlanTier;

    async fn can_run_batch(&self, owner_id: &str, count: usize) -> QueueResult<BatchDecision>;
}

/// First instant of the UTC calendar month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Gate backed by the plan store and the job records of the current month.
#[derive(Clone)]
pub struct PlanEntitlementGate {
    plans: Arc<dyn PlanStore>,
    jobs: Arc<dyn JobStore>,
}

impl PlanEntitlementGate {
    pub fn new(plans: Arc<dyn PlanStore>, jobs: Arc<dyn JobStore>) -> Self {
        Self { plans, jobs }
    }

    /// Jobs the owner created since the start of the current month.
    pub async fn monthly_usage(&self, owner_id: &str) -> QueueResult<u64> {
        let since = month_start(Utc::now());
        Ok(self.jobs.count_created_since(owner_id, since).await?)
    }
}

#[async_trait]
impl EntitlementGate for PlanEntitlementGate {
    async fn plan_for(&self, owner_id: &str) -> PlanTier {
        match self.plans.plan_for(owner_id).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "Plan lookup failed, defaulting to free");
                PlanTier::Free
            }
        }
    }

    async fn can_run_batch(&self, owner_id: &str, count: usize) -> QueueResult<BatchDecision> {
        let plan = self.plan_for(owner_id).await;
        let Some(max) = plan.limits().max_monthly_jobs else {
            return Ok(BatchDecision::allow(plan));
        };

        let used = self.monthly_usage(owner_id).await?;
        if used + count as u64 > u64::from(max) {
            info!(owner_id = %owner_id, plan = %plan, used, max, requested = count, "Batch denied by monthly quota");
            return Ok(BatchDecision::deny(
                plan,
                format!("Monthly limit reached ({}/{}). Upgrade to continue.", used, max),
                used,
            ));
        }

        debug!(owner_id = %owner_id, plan = %plan, used, requested = count, "Batch allowed");
        Ok(BatchDecision::allow(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capflow_firestore::MemoryStore;
    use capflow_models::Job;

    fn gate(store: &MemoryStore) -> PlanEntitlementGate {
        let store = Arc::new(store.clone());
        PlanEntitlementGate::new(store.clone(), store)
    }

    async fn seed_jobs(store: &MemoryStore, owner: &str, n: usize) {
        for _ in 0..n {
            JobStore::insert(store, &Job::from_url(owner, "https://example.com/a.mp4"))
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_month_start() {
        let now = Utc.with_ymd_and_hms(2024, 3, 17, 12, 30, 0).unwrap();
        assert_eq!(month_start(now), Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_concurrency_limit_follows_plan() {
        let store = MemoryStore::new();
        let gate = gate(&store);
        assert_eq!(gate.concurrency_limit(PlanTier::Free), 1);
        assert_eq!(gate.concurrency_limit(PlanTier::Pro), 3);
        assert_eq!(gate.concurrency_limit(PlanTier::Enterprise), 5);
    }

    #[tokio::test]
    async fn test_batch_within_quota_is_allowed() {
        let store = MemoryStore::new();
        seed_jobs(&store, "u1", 4).await;
        let decision = gate(&store).can_run_batch("u1", 6).await.unwrap();
        assert_eq!(decision, BatchDecision::allow(PlanTier::Free));
    }

    #[tokio::test]
    async fn test_batch_over_quota_is_denied_with_usage() {
        let store = MemoryStore::new();
        seed_jobs(&store, "u1", 8).await;
        seed_jobs(&store, "someone-else", 5).await;

        let decision = gate(&store).can_run_batch("u1", 3).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.current_usage, Some(8));
        assert_eq!(
            decision.reason.as_deref(),
            Some("Monthly limit reached (8/10). Upgrade to continue.")
        );
    }

    #[tokio::test]
    async fn test_unlimited_plan_skips_usage() {
        let store = MemoryStore::new();
        store.set_plan("u1", PlanTier::Enterprise).await;
        seed_jobs(&store, "u1", 50).await;
        let decision = gate(&store).can_run_batch("u1", 500).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.plan, PlanTier::Enterprise);
    }

    #[test]
    fn test_denial_serializes_camel_case() {
        let json = serde_json::to_value(BatchDecision::deny(PlanTier::Pro, "nope", 100)).unwrap();
        assert_eq!(json["currentUsage"], 100);
        assert_eq!(json["plan"], "pro");
    }
}
