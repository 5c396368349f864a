//! Closed patch type for job mutations.

use chrono::{DateTime, Utc};

use crate::edit::{Sequence, VideoCut};
use crate::job::Job;
use crate::job_status::{JobStatus, JobStep};
use crate::subtitle::{CaptionData, SubtitleConfig};

/// Partial update over the known mutable job fields.
///
/// Nullable fields use `Option<Option<T>>`: outer `None` leaves the field
/// untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub step: Option<Option<JobStep>>,
    pub progress: Option<f64>,
    pub result_srt_url: Option<Option<String>>,
    pub result_video_url: Option<Option<String>>,
    pub error_message: Option<Option<String>>,
    pub caption_source: Option<CaptionData>,
    pub caption_edit: Option<CaptionData>,
    pub subtitle_config: Option<SubtitleConfig>,
    pub cuts: Option<Vec<VideoCut>>,
    pub sequence: Option<Sequence>,
}

impl JobPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage entry: status, step and progress, clearing any previous error.
    pub fn stage(status: JobStatus, step: JobStep, progress: f64) -> Self {
        Self {
            status: Some(status),
            step: Some(Some(step)),
            progress: Some(progress),
            error_message: Some(None),
            ..Default::default()
        }
    }

    /// Stage failure, keeping the step and progress reached.
    pub fn failed(step: Option<JobStep>, progress: f64, message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Error),
            step: Some(step),
            progress: Some(progress),
            error_message: Some(Some(message.into())),
            ..Default::default()
        }
    }

    /// Cancellation clears the step and preserves progress.
    pub fn canceled() -> Self {
        Self {
            status: Some(JobStatus::Canceled),
            step: Some(None),
            ..Default::default()
        }
    }

    /// In-place reset used by bulk retry.
    pub fn retry_reset() -> Self {
        Self {
            status: Some(JobStatus::Pending),
            step: Some(None),
            progress: Some(0.0),
            error_message: Some(None),
            ..Default::default()
        }
    }

    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_result_srt_url(mut self, url: impl Into<String>) -> Self {
        self.result_srt_url = Some(Some(url.into()));
        self
    }

    pub fn with_result_video_url(mut self, url: Option<String>) -> Self {
        if url.is_some() {
            self.result_video_url = Some(url);
        }
        self
    }

    pub fn with_caption_source(mut self, caption: CaptionData) -> Self {
        self.caption_source = Some(caption);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Status reached after this patch is applied to a job in `current`.
    pub fn target_status(&self, current: JobStatus) -> JobStatus {
        self.status.unwrap_or(current)
    }

    /// Wire names of the fields this patch touches, plus `updatedAt`.
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        if self.status.is_some() {
            paths.push("status");
        }
        if self.step.is_some() {
            paths.push("step");
        }
        if self.progress.is_some() {
            paths.push("progress");
        }
        if self.result_srt_url.is_some() {
            paths.push("resultSrtUrl");
        }
        if self.result_video_url.is_some() {
            paths.push("resultVideoUrl");
        }
        if self.error_message.is_some() {
            paths.push("errorMessage");
        }
        if self.caption_source.is_some() {
            paths.push("captionSource");
        }
        if self.caption_edit.is_some() {
            paths.push("captionEdit");
            paths.push("editedAt");
        }
        if self.subtitle_config.is_some() {
            paths.push("subtitleConfig");
        }
        if self.cuts.is_some() {
            paths.push("cuts");
        }
        if self.sequence.is_some() {
            paths.push("sequence");
        }
        paths.push("updatedAt");
        paths
    }

    /// Apply to a job record.
    ///
    /// Progress is clamped to [0, 1] and never decreases unless the patch
    /// moves the job back to a pre-run status.
    pub fn apply(&self, job: &mut Job, now: DateTime<Utc>) {
        let resets = matches!(
            self.status,
            Some(JobStatus::Pending) | Some(JobStatus::Draft) | Some(JobStatus::Queued)
        );

        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(step) = self.step {
            job.step = step;
        }
        if let Some(progress) = self.progress {
            let progress = progress.clamp(0.0, 1.0);
            job.progress = if resets { progress } else { job.progress.max(progress) };
        }
        if let Some(url) = &self.result_srt_url {
            job.result_srt_url = url.clone();
        }
        if let Some(url) = &self.result_video_url {
            job.result_video_url = url.clone();
        }
        if let Some(message) = &self.error_message {
            job.error_message = message.clone();
        }
        if let Some(caption) = &self.caption_source {
            job.caption_source = Some(caption.clone());
        }
        if let Some(caption) = &self.caption_edit {
            job.caption_edit = Some(caption.clone());
            job.edited_at = Some(now);
        }
        if let Some(config) = &self.subtitle_config {
            job.subtitle_config = Some(config.clone());
        }
        if let Some(cuts) = &self.cuts {
            job.cuts = Some(cuts.clone());
        }
        if let Some(sequence) = &self.sequence {
            job.sequence = Some(sequence.clone());
        }
        job.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::from_url("u1", "https://example.com/a.mp4")
    }

    #[test]
    fn test_stage_patch_sets_status_step_progress() {
        let mut j = job();
        JobPatch::stage(JobStatus::Stt, JobStep::Transcribe, 0.3).apply(&mut j, Utc::now());
        assert_eq!(j.status, JobStatus::Stt);
        assert_eq!(j.step, Some(JobStep::Transcribe));
        assert_eq!(j.progress, 0.3);
    }

    #[test]
    fn test_progress_is_monotonic_while_running() {
        let mut j = job().with_status(JobStatus::Translating);
        j.progress = 0.7;
        JobPatch::stage(JobStatus::Translating, JobStep::Translate, 0.3).apply(&mut j, Utc::now());
        assert_eq!(j.progress, 0.7);
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut j = job();
        JobPatch::stage(JobStatus::Uploading, JobStep::Deliver, 4.0).apply(&mut j, Utc::now());
        assert_eq!(j.progress, 1.0);
    }

    #[test]
    fn test_retry_reset_clears_state() {
        let mut j = job().with_status(JobStatus::Error);
        j.progress = 0.7;
        j.step = Some(JobStep::Translate);
        j.error_message = Some("boom".to_string());

        JobPatch::retry_reset().apply(&mut j, Utc::now());
        assert_eq!(j.status, JobStatus::Pending);
        assert_eq!(j.progress, 0.0);
        assert!(j.step.is_none());
        assert!(j.error_message.is_none());
    }

    #[test]
    fn test_cancel_preserves_progress() {
        let mut j = job().with_status(JobStatus::Downloading);
        j.progress = 0.05;
        j.step = Some(JobStep::Download);
        JobPatch::canceled().apply(&mut j, Utc::now());
        assert_eq!(j.status, JobStatus::Canceled);
        assert!(j.step.is_none());
        assert_eq!(j.progress, 0.05);
    }

    #[test]
    fn test_caption_edit_stamps_edited_at() {
        let mut j = job();
        let patch = JobPatch {
            caption_edit: Some(CaptionData::new(vec![], SubtitleConfig::default())),
            ..Default::default()
        };
        patch.apply(&mut j, Utc::now());
        assert!(j.edited_at.is_some());
        assert!(patch.field_paths().contains(&"editedAt"));
    }

    #[test]
    fn test_field_paths_and_empty() {
        assert!(JobPatch::new().is_empty());
        assert_eq!(JobPatch::new().field_paths(), vec!["updatedAt"]);
        let paths = JobPatch::failed(Some(JobStep::Translate), 0.7, "x").field_paths();
        assert_eq!(paths, vec!["status", "step", "progress", "errorMessage", "updatedAt"]);
    }
}
