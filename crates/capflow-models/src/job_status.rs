//! Job status graph and pipeline step names.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Lifecycle status of a job.
///
/// `Draft` and `Queued` are queue-local pre-states that feed into `Pending`.
/// The seven in-flight stage statuses are reported while the pipeline runs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Parked in a queue, excluded from admission
    Draft,
    /// Admitted to a queue run, waiting for a slot
    Queued,
    /// Created and ready to start
    #[default]
    Pending,
    Downloading,
    Uploading,
    Preprocessing,
    Stt,
    Translating,
    Subtitle,
    Compositing,
    /// Finished successfully
    Done,
    /// A stage failed
    Error,
    /// Canceled by the owner
    Canceled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 13] = [
        JobStatus::Draft,
        JobStatus::Queued,
        JobStatus::Pending,
        JobStatus::Downloading,
        JobStatus::Uploading,
        JobStatus::Preprocessing,
        JobStatus::Stt,
        JobStatus::Translating,
        JobStatus::Subtitle,
        JobStatus::Compositing,
        JobStatus::Done,
        JobStatus::Error,
        JobStatus::Canceled,
    ];

    /// Statuses reported while a stage is executing.
    pub const ACTIVE: [JobStatus; 7] = [
        JobStatus::Downloading,
        JobStatus::Uploading,
        JobStatus::Preprocessing,
        JobStatus::Stt,
        JobStatus::Translating,
        JobStatus::Subtitle,
        JobStatus::Compositing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Draft => "draft",
            JobStatus::Queued => "queued",
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Uploading => "uploading",
            JobStatus::Preprocessing => "preprocessing",
            JobStatus::Stt => "stt",
            JobStatus::Translating => "translating",
            JobStatus::Subtitle => "subtitle",
            JobStatus::Compositing => "compositing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Canceled => "canceled",
        }
    }

    /// Check if this is a terminal state (no more pipeline writes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Canceled)
    }

    /// True while a pipeline stage is in flight.
    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// A pipeline run may claim the job from this status.
    pub fn is_startable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Queued)
    }

    pub fn is_cancelable(&self) -> bool {
        *self == JobStatus::Pending || self.is_active()
    }

    /// Single retry is legal from failure, cancellation, or the two statuses
    /// in which externally detected stalls park a job.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobStatus::Error | JobStatus::Canceled | JobStatus::Translating | JobStatus::Preprocessing
        )
    }

    /// Jobs in an active status must not be hard-deleted.
    pub fn is_deletable(&self) -> bool {
        !self.is_active()
    }

    /// Whether `next` is reachable from `self` in one write.
    ///
    /// Rewriting a non-terminal status is allowed (stage progress updates).
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;

        if *self == next {
            return !self.is_terminal();
        }

        match self {
            Draft => matches!(next, Queued | Pending),
            Queued => matches!(next, Draft | Pending) || next.is_active(),
            Pending => matches!(next, Error | Canceled) || next.is_active(),
            Downloading | Uploading | Preprocessing | Stt | Translating | Subtitle | Compositing => {
                matches!(next, Done | Error | Canceled | Pending) || next.is_active()
            }
            Error | Canceled => next == Pending,
            Done => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| ModelError::InvalidStatus(s.to_string()))
    }
}

/// Named pipeline step recorded alongside the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStep {
    Upload,
    Prepare,
    Download,
    Transcribe,
    Translate,
    Subtitle,
    Composite,
    Deliver,
}

impl JobStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStep::Upload => "upload",
            JobStep::Prepare => "prepare",
            JobStep::Download => "download",
            JobStep::Transcribe => "transcribe",
            JobStep::Translate => "translate",
            JobStep::Subtitle => "subtitle",
            JobStep::Composite => "composite",
            JobStep::Deliver => "deliver",
        }
    }
}

impl fmt::Display for JobStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStep {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(JobStep::Upload),
            "prepare" => Ok(JobStep::Prepare),
            "download" => Ok(JobStep::Download),
            "transcribe" => Ok(JobStep::Transcribe),
            "translate" => Ok(JobStep::Translate),
            "subtitle" => Ok(JobStep::Subtitle),
            "composite" => Ok(JobStep::Composite),
            "deliver" => Ok(JobStep::Deliver),
            other => Err(ModelError::InvalidStep(other.to_string())),
        }
    }
}
