//! Job listing filters and pages.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::job::Job;
use crate::job_status::JobStatus;

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Status filter; `processing` matches every in-flight stage status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Exact(JobStatus),
    Processing,
}

impl StatusFilter {
    pub fn matches(&self, status: JobStatus) -> bool {
        match self {
            StatusFilter::Exact(s) => *s == status,
            StatusFilter::Processing => status.is_active(),
        }
    }

    /// Concrete statuses covered by this filter.
    pub fn statuses(&self) -> Vec<JobStatus> {
        match self {
            StatusFilter::Exact(s) => vec![*s],
            StatusFilter::Processing => JobStatus::ACTIVE.to_vec(),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "processing" {
            return Ok(StatusFilter::Processing);
        }
        s.parse::<JobStatus>().map(StatusFilter::Exact)
    }
}

/// Filter for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub owner_id: Option<String>,
    pub status: Option<StatusFilter>,
    /// Substring of the job id or url
    pub search: Option<String>,
    pub project_id: Option<String>,
    pub queue_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: u32,
    pub limit: u32,
}

impl JobFilter {
    pub fn for_owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            ..Default::default()
        }
    }

    /// Page number, at least 1.
    pub fn page(&self) -> u32 {
        self.page.max(1)
    }

    /// Page size in 1..=100; zero means the default.
    pub fn limit(&self) -> u32 {
        if self.limit == 0 {
            DEFAULT_PAGE_LIMIT
        } else {
            self.limit.min(MAX_PAGE_LIMIT)
        }
    }

    /// Jobs skipped before the page; saturates instead of wrapping.
    pub fn offset(&self) -> usize {
        (self.page() as usize - 1).saturating_mul(self.limit() as usize)
    }

    pub fn matches(&self, job: &Job) -> bool {
        if let Some(owner) = &self.owner_id {
            if &job.owner_id != owner {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if !status.matches(job.status) {
                return false;
            }
        }
        if let Some(project) = &self.project_id {
            if job.project_id.as_ref() != Some(project) {
                return false;
            }
        }
        if let Some(queue) = &self.queue_id {
            if job.queue_id.as_ref() != Some(queue) {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if job.created_at < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if job.created_at > end {
                return false;
            }
        }
        if let Some(term) = self.search.as_deref().filter(|t| !t.is_empty()) {
            let term = term.to_lowercase();
            let in_id = job.id.as_str().to_lowercase().contains(&term);
            let in_url = job
                .url
                .as_deref()
                .map(|u| u.to_lowercase().contains(&term))
                .unwrap_or(false);
            if !in_id && !in_url {
                return false;
            }
        }
        true
    }

    /// Sort newest first and cut out the requested page.
    pub fn paginate(&self, mut jobs: Vec<Job>) -> JobPage {
        jobs.retain(|j| self.matches(j));
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = jobs.len() as u64;
        let page_jobs = jobs.into_iter().skip(self.offset()).take(self.limit() as usize).collect();
        JobPage::new(page_jobs, total, self.page(), self.limit())
    }
}

/// One page of a job listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl JobPage {
    pub fn new(jobs: Vec<Job>, total: u64, page: u32, limit: u32) -> Self {
        let limit_u64 = u64::from(limit.max(1));
        Self {
            jobs,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit_u64),
        }
    }
}

/// Number of jobs per status.
pub type StatusCounts = BTreeMap<JobStatus, u64>;
