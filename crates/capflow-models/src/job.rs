//! Job record and creation request.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::edit::{Sequence, VideoCut};
use crate::error::{ModelError, ModelResult};
use crate::job_status::{JobStatus, JobStep};
use crate::source::SourceType;
use crate::subtitle::{CaptionData, SubtitleConfig};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One run of the media pipeline for a single source reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,

    /// Owning user
    pub owner_id: String,

    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub queue_id: Option<String>,

    /// Position among the queue's drafts
    #[serde(default)]
    pub queue_position: Option<u32>,

    /// Source URL (absent for asset and sequence jobs)
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub asset_id: Option<String>,

    pub source_type: SourceType,

    pub status: JobStatus,

    /// Current stage name
    #[serde(default)]
    pub step: Option<JobStep>,

    /// Fraction complete in [0, 1]
    #[serde(default)]
    pub progress: f64,

    #[serde(default)]
    pub subtitle_config: Option<SubtitleConfig>,

    /// Caption document produced by the pipeline
    #[serde(default)]
    pub caption_source: Option<CaptionData>,

    /// Caption document after user edits
    #[serde(default)]
    pub caption_edit: Option<CaptionData>,

    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,

    /// Segments to keep; `None` means the whole source
    #[serde(default)]
    pub cuts: Option<Vec<VideoCut>>,

    #[serde(default)]
    pub sequence: Option<Sequence>,

    /// Render subtitles into the video after generation
    #[serde(default)]
    pub burn_in_subtitles: bool,

    #[serde(default)]
    pub result_srt_url: Option<String>,

    #[serde(default)]
    pub result_video_url: Option<String>,

    #[serde(default)]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a pending job for a URL source.
    pub fn from_url(owner_id: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let source_type = SourceType::classify(&url);
        Self::blank(owner_id.into(), source_type).with_url(url)
    }

    /// Create a pending job for a stored asset.
    pub fn from_asset(owner_id: impl Into<String>, asset_id: impl Into<String>) -> Self {
        let mut job = Self::blank(owner_id.into(), SourceType::Upload);
        job.asset_id = Some(asset_id.into());
        job
    }

    /// Create a pending job for an edit sequence.
    pub fn from_sequence(owner_id: impl Into<String>, sequence: Sequence) -> Self {
        let mut job = Self::blank(owner_id.into(), SourceType::Sequence);
        job.sequence = Some(sequence);
        job
    }

    fn blank(owner_id: String, source_type: SourceType) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner_id,
            project_id: None,
            queue_id: None,
            queue_position: None,
            url: None,
            asset_id: None,
            source_type,
            status: JobStatus::Pending,
            step: None,
            progress: 0.0,
            subtitle_config: None,
            caption_source: None,
            caption_edit: None,
            edited_at: None,
            cuts: None,
            sequence: None,
            burn_in_subtitles: false,
            result_srt_url: None,
            result_video_url: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Park the job as a draft at `position` in a queue.
    pub fn as_draft_in(mut self, queue_id: impl Into<String>, position: u32) -> Self {
        self.queue_id = Some(queue_id.into());
        self.queue_position = Some(position);
        self.status = JobStatus::Draft;
        self
    }

    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    pub fn with_subtitle_config(mut self, config: SubtitleConfig) -> Self {
        self.subtitle_config = Some(config);
        self
    }

    pub fn with_cuts(mut self, cuts: Vec<VideoCut>) -> Self {
        self.cuts = Some(cuts);
        self
    }

    pub fn with_burn_in(mut self, burn_in: bool) -> Self {
        self.burn_in_subtitles = burn_in;
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    /// Fresh pending record carrying this job's source and configuration.
    ///
    /// Used by single retry; results, captions and queue placement are not copied.
    pub fn fork(&self) -> Self {
        let mut job = Self::blank(self.owner_id.clone(), self.source_type);
        job.project_id = self.project_id.clone();
        job.url = self.url.clone();
        job.asset_id = self.asset_id.clone();
        job.sequence = self.sequence.clone();
        job.cuts = self.cuts.clone();
        job.subtitle_config = self.subtitle_config.clone();
        job.burn_in_subtitles = self.burn_in_subtitles;
        job
    }

    /// Effective subtitle style.
    pub fn style(&self) -> SubtitleConfig {
        self.subtitle_config.clone().unwrap_or_default()
    }

    /// Kept segments, if any were specified.
    pub fn active_cuts(&self) -> Option<&[VideoCut]> {
        self.cuts.as_deref().filter(|c| !c.is_empty())
    }
}

/// Request to create a job.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_has_source"))]
pub struct JobCreateRequest {
    #[validate(url)]
    pub url: Option<String>,
    pub asset_id: Option<String>,
    pub project_id: Option<String>,
    pub sequence: Option<Sequence>,
    pub cuts: Option<Vec<VideoCut>>,
    pub source_type: Option<SourceType>,
    pub subtitle_config: Option<SubtitleConfig>,
    #[serde(default)]
    pub burn_in_subtitles: bool,
    /// Start the pipeline right after creation
    #[serde(default = "default_true")]
    pub auto_start: bool,
}

fn default_true() -> bool {
    true
}

fn validate_has_source(req: &JobCreateRequest) -> Result<(), ValidationError> {
    let has_url = req.url.as_deref().is_some_and(|u| !u.trim().is_empty());
    let has_asset = req.asset_id.as_deref().is_some_and(|a| !a.trim().is_empty());
    let has_sequence = req.sequence.as_ref().is_some_and(|s| !s.is_empty());

    if has_url || has_asset || has_sequence {
        Ok(())
    } else {
        let mut err = ValidationError::new("missing_source");
        err.message = Some("Either 'url' or 'assetId' is required".into());
        Err(err)
    }
}

impl JobCreateRequest {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            auto_start: true,
            ..Default::default()
        }
    }

    /// Validate and build the pending job record for `owner_id`.
    pub fn into_job(self, owner_id: impl Into<String>) -> ModelResult<Job> {
        self.validate()?;
        let owner_id = owner_id.into();

        let mut job = if let Some(sequence) = self.sequence.filter(|s| !s.is_empty()) {
            let job = Job::from_sequence(owner_id, sequence);
            match self.url {
                Some(url) => job.with_url(url),
                None => job,
            }
        } else if let Some(asset_id) = self.asset_id.filter(|a| !a.trim().is_empty()) {
            let job = Job::from_asset(owner_id, asset_id);
            match self.url {
                Some(url) => job.with_url(url),
                None => job,
            }
        } else {
            let url = self
                .url
                .ok_or_else(|| ModelError::validation("Either 'url' or 'assetId' is required"))?;
            Job::from_url(owner_id, url)
        };

        if let Some(source_type) = self.source_type {
            job.source_type = source_type;
        }
        job.project_id = self.project_id;
        job.cuts = self.cuts;
        job.subtitle_config = self.subtitle_config;
        job.burn_in_subtitles = self.burn_in_subtitles;
        Ok(job)
    }
}
