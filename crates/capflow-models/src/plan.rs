//! Plan tiers and their concurrency and quota limits.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Plan tier enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl PlanTier {
    /// Parse from string (case-insensitive). Unknown plans map to Free.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pro" => PlanTier::Pro,
            "enterprise" => PlanTier::Enterprise,
            _ => PlanTier::Free,
        }
    }

    /// Get the plan name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }

    pub fn limits(&self) -> PlanLimits {
        PlanLimits::for_tier(*self)
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Plan limits configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    /// Jobs a single queue run may drive at once.
    pub concurrent_jobs: usize,
    /// Jobs per calendar month; `None` is unlimited.
    pub max_monthly_jobs: Option<u32>,
}

impl PlanLimits {
    /// Create limits for a specific plan tier.
    pub fn for_tier(tier: PlanTier) -> Self {
        match tier {
            PlanTier::Free => Self {
                concurrent_jobs: 1,
                max_monthly_jobs: Some(10),
            },
            PlanTier::Pro => Self {
                concurrent_jobs: 3,
                max_monthly_jobs: Some(100),
            },
            PlanTier::Enterprise => Self {
                concurrent_jobs: 5,
                max_monthly_jobs: None,
            },
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_monthly_jobs.is_none()
    }
}
