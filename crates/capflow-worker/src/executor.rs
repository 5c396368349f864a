//! Pipeline executor.
//!
//! Runs one job through its stages. Every status write is a compare-and-set
//! on the status this run wrote last: a cancel that lands between stages
//! makes the next write fail and the run stops without touching the record.
//! The claim out of `pending`/`queued` is the same kind of write, so only
//! one of several concurrent runs for a job proceeds.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{debug, warn, Instrument};

use capflow_firestore::{JobStore, Transition};
use capflow_models::{Job, JobId, JobPatch, JobStatus, JobStep, SubtitleConfig, WebhookEvent};
use capflow_storage::{sequence_cache_key, source_fingerprint, trimmed_audio_cache_key, ObjectStorage};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::media_cache::MediaCacheService;
use crate::metrics::{record_job_finished, record_job_started, record_stage_duration};
use crate::notifier::Notifier;
use crate::ops::{MediaOps, MediaSource, SpeechToText, SubtitleDocument, SubtitleGenerator, TranscriptSegment, Translator};

const SRT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// External operations used by the stages.
#[derive(Clone)]
pub struct StageOps {
    pub media: Arc<dyn MediaOps>,
    pub stt: Arc<dyn SpeechToText>,
    pub translator: Arc<dyn Translator>,
    pub subtitles: Arc<dyn SubtitleGenerator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Prepare,
    Transcribe,
    Translate,
    Subtitle,
    Composite,
    Deliver,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Prepare => "prepare",
            Stage::Transcribe => "transcribe",
            Stage::Translate => "translate",
            Stage::Subtitle => "subtitle",
            Stage::Composite => "composite",
            Stage::Deliver => "deliver",
        }
    }

    pub fn status(self) -> JobStatus {
        match self {
            Stage::Extract => JobStatus::Downloading,
            Stage::Prepare => JobStatus::Preprocessing,
            Stage::Transcribe => JobStatus::Stt,
            Stage::Translate => JobStatus::Translating,
            Stage::Subtitle => JobStatus::Subtitle,
            Stage::Composite => JobStatus::Compositing,
            Stage::Deliver => JobStatus::Uploading,
        }
    }

    pub fn step(self) -> JobStep {
        match self {
            Stage::Extract => JobStep::Download,
            Stage::Prepare => JobStep::Prepare,
            Stage::Transcribe => JobStep::Transcribe,
            Stage::Translate => JobStep::Translate,
            Stage::Subtitle => JobStep::Subtitle,
            Stage::Composite => JobStep::Composite,
            Stage::Deliver => JobStep::Deliver,
        }
    }

    /// Progress recorded when the stage starts.
    pub fn progress(self) -> f64 {
        match self {
            Stage::Extract => 0.05,
            Stage::Prepare => 0.15,
            Stage::Transcribe => 0.30,
            Stage::Translate => 0.70,
            Stage::Subtitle => 0.85,
            Stage::Composite => 0.90,
            Stage::Deliver => 0.95,
        }
    }

    fn entry(self) -> JobPatch {
        JobPatch::stage(self.status(), self.step(), self.progress())
    }

    /// Stages a job runs through, in order.
    pub fn plan(job: &Job) -> Vec<Stage> {
        let mut stages = vec![
            Stage::Extract,
            Stage::Prepare,
            Stage::Transcribe,
            Stage::Translate,
            Stage::Subtitle,
        ];
        if job.burn_in_subtitles {
            stages.push(Stage::Composite);
        }
        stages.push(Stage::Deliver);
        stages
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The job was not startable, or another writer moved it first.
    Skipped { current: Option<JobStatus> },
    /// A cancel was observed at a stage boundary.
    Canceled { stage: Stage },
    Completed(Job),
    Failed { stage: Stage, message: String },
}

#[derive(Default)]
struct PipelineContext {
    style: SubtitleConfig,
    audio_url: Option<String>,
    video_url: Option<String>,
    sequence_hash: Option<String>,
    original: Vec<TranscriptSegment>,
    translated: Vec<TranscriptSegment>,
    document: Option<SubtitleDocument>,
    rendered_video_url: Option<String>,
    srt_url: Option<String>,
}

fn missing(what: &str) -> WorkerError {
    WorkerError::stage(format!("{} missing before stage", what))
}

/// Message recorded on the job for a stage failure.
fn failure_message(error: &WorkerError) -> String {
    match error {
        WorkerError::StageExecution(msg) => msg.clone(),
        other => other.to_string(),
    }
}

pub struct PipelineExecutor {
    jobs: Arc<dyn JobStore>,
    storage: Arc<dyn ObjectStorage>,
    cache: MediaCacheService,
    ops: StageOps,
    notifier: Arc<dyn Notifier>,
    config: WorkerConfig,
}

impl PipelineExecutor {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        storage: Arc<dyn ObjectStorage>,
        cache: MediaCacheService,
        ops: StageOps,
        notifier: Arc<dyn Notifier>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            jobs,
            storage,
            cache,
            ops,
            notifier,
            config,
        }
    }

    /// Run the pipeline for `id`.
    ///
    /// Only a `pending` or `queued` job is claimed; with `force` a job left
    /// in an in-flight status (crash resume) is claimed too and restarts from
    /// the first stage. Store errors are returned; stage errors are recorded
    /// on the job and reported as [`RunOutcome::Failed`].
    pub async fn run(&self, id: &JobId, force: bool) -> WorkerResult<RunOutcome> {
        let logger = JobLogger::new(id, "subtitle_pipeline");
        let span = logger.create_span();
        self.run_logged(id, force, &logger).instrument(span).await
    }

    async fn run_logged(&self, id: &JobId, force: bool, logger: &JobLogger) -> WorkerResult<RunOutcome> {
        let mut claimable = vec![JobStatus::Pending, JobStatus::Queued];
        if force {
            claimable.extend(JobStatus::ACTIVE);
        }

        let first = Stage::Extract;
        let job = match self.jobs.update_if_status(id, &claimable, &first.entry()).await? {
            Transition::Applied(job) => job,
            Transition::Conflict { current, .. } => {
                debug!(job_id = %id, current = ?current, "Job not startable, skipping run");
                return Ok(RunOutcome::Skipped { current });
            }
        };

        record_job_started();
        logger.log_start(job.source_type.as_str());
        self.notifier.trigger(
            &job.owner_id,
            WebhookEvent::JobStarted,
            json!({ "jobId": job.id, "status": first.status() }),
        );

        let mut ctx = PipelineContext {
            style: job.style(),
            ..Default::default()
        };
        let mut current = first.status();

        for (index, stage) in Stage::plan(&job).into_iter().enumerate() {
            if index > 0 {
                match self.jobs.update_if_status(id, &[current], &stage.entry()).await? {
                    Transition::Applied(_) => current = stage.status(),
                    Transition::Conflict { current: now, .. } => return Ok(self.interrupted(logger, stage, now)),
                }
            }

            logger.log_stage(stage.name(), stage.progress());
            let started = Instant::now();
            let result = self.run_stage(stage, &job, &mut ctx).await;
            record_stage_duration(stage.name(), started.elapsed());

            if let Err(e) = result {
                return self.fail(&job, stage, current, &e, logger).await;
            }
        }

        self.complete(&job, current, ctx, logger).await
    }

    async fn run_stage(&self, stage: Stage, job: &Job, ctx: &mut PipelineContext) -> WorkerResult<()> {
        match stage {
            Stage::Extract => self.extract(job, ctx).await,
            Stage::Prepare => self.prepare(job, ctx).await,
            Stage::Transcribe => {
                let audio = ctx.audio_url.as_deref().ok_or_else(|| missing("Audio"))?;
                let transcription = self.ops.stt.transcribe(audio).await?;
                debug!(job_id = %job.id, segments = transcription.segments.len(), language = ?transcription.language, "Transcribed");
                ctx.original = transcription.segments;
                Ok(())
            }
            Stage::Translate => {
                ctx.translated = self
                    .ops
                    .translator
                    .translate(&ctx.original, &self.config.target_locale)
                    .await?;
                Ok(())
            }
            Stage::Subtitle => {
                // A sequence render is already the target timeline
                let cuts = if job.sequence.is_some() { None } else { job.active_cuts() };
                let document = self
                    .ops
                    .subtitles
                    .generate(&ctx.original, &ctx.translated, &ctx.style, cuts)?;
                ctx.document = Some(document);
                Ok(())
            }
            Stage::Composite => {
                let video = ctx
                    .video_url
                    .as_deref()
                    .ok_or_else(|| WorkerError::stage("No video source available for subtitle burn-in"))?;
                let document = ctx.document.as_ref().ok_or_else(|| missing("Subtitles"))?;
                let key = format!("{}/videos/{}.mp4", self.config.results_prefix, job.id);
                let artifact = self.ops.media.composite(video, document, &key).await?;
                let url = self
                    .storage
                    .signed_url(&artifact.storage_key, self.config.signed_url_ttl)
                    .await?;
                ctx.rendered_video_url = Some(url);
                Ok(())
            }
            Stage::Deliver => {
                let document = ctx.document.as_ref().ok_or_else(|| missing("Subtitles"))?;
                let key = format!("{}/subtitles/{}/{}", self.config.results_prefix, job.id, document.file_name);
                let url = self
                    .storage
                    .put(document.srt.as_bytes().to_vec(), &key, SRT_CONTENT_TYPE)
                    .await?;
                ctx.srt_url = Some(url);
                Ok(())
            }
        }
    }

    async fn extract(&self, job: &Job, ctx: &mut PipelineContext) -> WorkerResult<()> {
        let media = self.ops.media.as_ref();

        let extracted = if let Some(sequence) = job.sequence.as_ref().filter(|s| !s.is_empty()) {
            let clips = sequence.active_clips();
            let key = sequence_cache_key(clips);
            ctx.sequence_hash = Some(key.hash.clone());
            let rendered = self
                .cache
                .get_or_compute(&key, |output_key| async move { media.render_sequence(clips, &output_key).await })
                .await?;
            let mut extracted = media.extract_audio(&MediaSource::Url(rendered.url.clone())).await?;
            extracted.video_url = Some(rendered.url);
            extracted
        } else if let Some(asset_id) = job.asset_id.as_deref().filter(|a| !a.is_empty()) {
            media.extract_audio(&MediaSource::Asset(asset_id.to_string())).await?
        } else if let Some(url) = job.url.as_deref().filter(|u| !u.is_empty()) {
            media.extract_audio(&MediaSource::Url(url.to_string())).await?
        } else {
            return Err(WorkerError::stage("Job has no media source"));
        };

        ctx.audio_url = Some(extracted.audio_url);
        ctx.video_url = extracted.video_url;
        Ok(())
    }

    /// Trim the audio to the kept segments, through the media cache.
    async fn prepare(&self, job: &Job, ctx: &mut PipelineContext) -> WorkerResult<()> {
        let Some(cuts) = job.active_cuts() else {
            return Ok(());
        };

        let fingerprint = source_fingerprint(
            job.asset_id.as_deref(),
            ctx.sequence_hash.as_deref(),
            job.url.as_deref(),
        )
        .ok_or_else(|| WorkerError::stage("Cannot identify the source to trim"))?;
        let key = trimmed_audio_cache_key(&fingerprint, cuts);
        let audio = ctx.audio_url.clone().ok_or_else(|| missing("Audio"))?;
        let media = self.ops.media.as_ref();

        let trimmed = self
            .cache
            .get_or_compute(&key, |output_key| async move { media.trim_audio(&audio, cuts, &output_key).await })
            .await?;
        debug!(job_id = %job.id, hash = %key.hash, cache_hit = trimmed.hit, cuts = cuts.len(), "Prepared trimmed audio");
        ctx.audio_url = Some(trimmed.url);
        Ok(())
    }

    async fn complete(
        &self,
        job: &Job,
        current: JobStatus,
        ctx: PipelineContext,
        logger: &JobLogger,
    ) -> WorkerResult<RunOutcome> {
        let srt_url = ctx.srt_url.ok_or_else(|| missing("Subtitle URL"))?;
        let mut patch = JobPatch {
            status: Some(JobStatus::Done),
            progress: Some(1.0),
            error_message: Some(None),
            ..JobPatch::new()
        }
        .with_result_srt_url(srt_url.clone())
        .with_result_video_url(ctx.rendered_video_url.or(ctx.video_url));
        if let Some(document) = ctx.document {
            patch = patch.with_caption_source(document.caption);
        }

        match self.jobs.update_if_status(&job.id, &[current], &patch).await? {
            Transition::Applied(done) => {
                record_job_finished(JobStatus::Done);
                logger.log_completion(&srt_url);
                self.notifier.trigger(
                    &job.owner_id,
                    WebhookEvent::JobCompleted,
                    json!({
                        "jobId": job.id,
                        "status": JobStatus::Done,
                        "resultSrtUrl": done.result_srt_url,
                        "resultVideoUrl": done.result_video_url,
                    }),
                );
                Ok(RunOutcome::Completed(done))
            }
            Transition::Conflict { current: now, .. } => Ok(self.interrupted(logger, Stage::Deliver, now)),
        }
    }

    async fn fail(
        &self,
        job: &Job,
        stage: Stage,
        current: JobStatus,
        error: &WorkerError,
        logger: &JobLogger,
    ) -> WorkerResult<RunOutcome> {
        let message = failure_message(error);
        logger.log_error(stage.name(), &message);

        let patch = JobPatch::failed(Some(stage.step()), stage.progress(), message.clone());
        match self.jobs.update_if_status(&job.id, &[current], &patch).await? {
            Transition::Applied(_) => {
                record_job_finished(JobStatus::Error);
                self.notifier.trigger(
                    &job.owner_id,
                    WebhookEvent::JobFailed,
                    json!({ "jobId": job.id, "error": message, "step": stage.step() }),
                );
                Ok(RunOutcome::Failed { stage, message })
            }
            Transition::Conflict { current: now, .. } => Ok(self.interrupted(logger, stage, now)),
        }
    }

    fn interrupted(&self, logger: &JobLogger, stage: Stage, now: Option<JobStatus>) -> RunOutcome {
        if now == Some(JobStatus::Canceled) {
            record_job_finished(JobStatus::Canceled);
            logger.log_warning(&format!("canceled before {}", stage.name()));
            RunOutcome::Canceled { stage }
        } else {
            warn!(job_id = %logger.job_id(), stage = stage.name(), current = ?now, "Job changed underneath the run, stopping");
            RunOutcome::Skipped { current: now }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use capflow_models::{Sequence, SequenceClip, VideoCut};
    use tokio::sync::Notify;

    const SOURCE: &str = "https://cdn.test/talk.mp4";

    fn stored_key(url: &str) -> &str {
        url.trim_start_matches("memory://capflow/")
    }

    #[tokio::test]
    async fn test_url_job_runs_to_done() {
        let h = Harness::new();
        let job = h.insert(Job::from_url("owner-1", SOURCE)).await;

        let outcome = h.executor.run(&job.id, false).await.unwrap();
        let done = match outcome {
            RunOutcome::Completed(done) => done,
            other => panic!("unexpected outcome {:?}", other),
        };

        assert_eq!(done.status, JobStatus::Done);
        assert_eq!(done.progress, 1.0);
        assert_eq!(done.error_message, None);
        assert_eq!(h.ops.calls(), vec!["extract", "transcribe", "translate"]);
        assert_eq!(done.result_video_url.as_deref(), Some("https://media.test/video/talk.mp4.mp4"));

        let srt_url = done.result_srt_url.clone().unwrap();
        assert!(srt_url.starts_with(&format!("memory://capflow/results/subtitles/{}/subtitles-", job.id)));
        let srt = String::from_utf8(h.storage.get(stored_key(&srt_url)).await.unwrap()).unwrap();
        assert!(srt.contains("[ko] hello"));
        assert_eq!(
            h.storage.content_type(stored_key(&srt_url)).await.as_deref(),
            Some("text/plain; charset=utf-8")
        );

        let caption = done.caption_source.unwrap();
        assert_eq!(caption.cues.len(), 2);
        assert_eq!(caption.cues[1].original_text.as_deref(), Some("world"));

        assert_eq!(h.notifier.events(), vec![WebhookEvent::JobStarted, WebhookEvent::JobCompleted]);
    }

    #[tokio::test]
    async fn test_every_write_follows_the_status_graph() {
        let h = Harness::new();
        let job = h.insert(Job::from_url("owner-1", SOURCE).with_burn_in(true)).await;
        h.executor.run(&job.id, false).await.unwrap();

        let transitions = h.jobs.transitions();
        let statuses: Vec<JobStatus> = transitions.iter().map(|(_, to)| *to).collect();
        assert_eq!(
            statuses,
            vec![
                JobStatus::Downloading,
                JobStatus::Preprocessing,
                JobStatus::Stt,
                JobStatus::Translating,
                JobStatus::Subtitle,
                JobStatus::Compositing,
                JobStatus::Uploading,
                JobStatus::Done,
            ]
        );
        for (from, to) in transitions {
            assert!(from.can_transition_to(to), "{} -> {}", from, to);
        }
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let h = Harness::new();
        let job = h.insert(Job::from_url("owner-1", SOURCE)).await;

        h.executor.run(&job.id, false).await.unwrap();
        let again = h.executor.run(&job.id, false).await.unwrap();

        assert_eq!(again, RunOutcome::Skipped { current: Some(JobStatus::Done) });
        assert_eq!(h.ops.count("extract"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_runs_claim_once() {
        let h = Harness::new();
        let job = h.insert(Job::from_url("owner-1", SOURCE)).await;

        let (a, b) = tokio::join!(h.executor.run(&job.id, false), h.executor.run(&job.id, false));
        let outcomes = [a.unwrap(), b.unwrap()];

        let completed = outcomes.iter().filter(|o| matches!(o, RunOutcome::Completed(_))).count();
        let skipped = outcomes.iter().filter(|o| matches!(o, RunOutcome::Skipped { .. })).count();
        assert_eq!((completed, skipped), (1, 1));
        assert_eq!(h.ops.count("extract"), 1);
    }

    #[tokio::test]
    async fn test_unstartable_jobs_are_skipped() {
        let h = Harness::new();
        let draft = h.insert(Job::from_url("owner-1", SOURCE).with_status(JobStatus::Draft)).await;

        assert_eq!(
            h.executor.run(&draft.id, false).await.unwrap(),
            RunOutcome::Skipped { current: Some(JobStatus::Draft) }
        );
        assert_eq!(
            h.executor.run(&JobId::from("missing"), false).await.unwrap(),
            RunOutcome::Skipped { current: None }
        );
        assert!(h.ops.calls().is_empty());
        assert!(h.notifier.events().is_empty());
    }

    #[tokio::test]
    async fn test_force_resumes_an_in_flight_job() {
        let h = Harness::new();
        let job = h.insert(Job::from_url("owner-1", SOURCE).with_status(JobStatus::Stt)).await;

        assert!(matches!(
            h.executor.run(&job.id, false).await.unwrap(),
            RunOutcome::Skipped { current: Some(JobStatus::Stt) }
        ));
        assert!(matches!(h.executor.run(&job.id, true).await.unwrap(), RunOutcome::Completed(_)));
        assert_eq!(h.job(&job.id).await.status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_stage_failure_is_recorded() {
        let h = Harness::with_ops(|ops| ops.failing("transcribe"));
        let job = h.insert(Job::from_url("owner-1", SOURCE)).await;

        let outcome = h.executor.run(&job.id, false).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Failed {
                stage: Stage::Transcribe,
                message: "transcribe unavailable".to_string(),
            }
        );

        let failed = h.job(&job.id).await;
        assert_eq!(failed.status, JobStatus::Error);
        assert_eq!(failed.step, Some(JobStep::Transcribe));
        assert_eq!(failed.progress, 0.30);
        assert_eq!(failed.error_message.as_deref(), Some("transcribe unavailable"));
        assert_eq!(failed.result_srt_url, None);
        assert_eq!(h.notifier.events(), vec![WebhookEvent::JobStarted, WebhookEvent::JobFailed]);
    }

    #[tokio::test]
    async fn test_cancel_mid_stage_stops_the_run() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let h = Harness::with_ops(|ops| ops.gated(entered.clone(), release.clone()));
        let job = h.insert(Job::from_url("owner-1", SOURCE)).await;

        let executor = h.executor.clone();
        let id = job.id.clone();
        let run = tokio::spawn(async move { executor.run(&id, false).await });

        entered.notified().await;
        let canceled = h
            .jobs
            .update_if_status(&job.id, &JobStatus::ACTIVE, &JobPatch::canceled())
            .await
            .unwrap();
        assert!(canceled.is_applied());
        release.notify_one();

        let outcome = run.await.unwrap().unwrap();
        assert_eq!(outcome, RunOutcome::Canceled { stage: Stage::Translate });

        let stored = h.job(&job.id).await;
        assert_eq!(stored.status, JobStatus::Canceled);
        assert_eq!(stored.step, None);
        assert_eq!(stored.progress, 0.30);
        assert_eq!(stored.result_srt_url, None);
        assert_eq!(h.ops.count("translate"), 0);
        assert!(h.storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_trimmed_audio_is_shared_between_jobs() {
        let h = Harness::new();
        let first = h
            .insert(Job::from_url("owner-1", SOURCE).with_cuts(vec![VideoCut::new(20.0, 25.0), VideoCut::new(10.0, 12.0)]))
            .await;
        let second = h
            .insert(Job::from_url("owner-2", SOURCE).with_cuts(vec![VideoCut::new(10.0, 12.0), VideoCut::new(20.0, 25.0)]))
            .await;

        let done = match h.executor.run(&first.id, false).await.unwrap() {
            RunOutcome::Completed(done) => done,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert!(matches!(h.executor.run(&second.id, false).await.unwrap(), RunOutcome::Completed(_)));

        assert_eq!(h.ops.count("trim"), 1);

        // Cues come back on the source timeline
        let cues = done.caption_source.unwrap().cues;
        assert_eq!((cues[0].start_time, cues[0].end_time), (10.0, 12.0));
        assert_eq!((cues[1].start_time, cues[1].end_time), (20.5, 22.0));
    }

    #[tokio::test]
    async fn test_sequence_job_renders_then_extracts() {
        let h = Harness::new();
        let clips = vec![
            SequenceClip {
                id: "b".to_string(),
                asset_id: "asset-2".to_string(),
                start_time: 0.0,
                end_time: 3.0,
                order: 1,
                speed: None,
            },
            SequenceClip {
                id: "a".to_string(),
                asset_id: "asset-1".to_string(),
                start_time: 5.0,
                end_time: 9.0,
                order: 0,
                speed: None,
            },
        ];
        let job = h.insert(Job::from_sequence("owner-1", Sequence::Clips(clips))).await;

        let done = match h.executor.run(&job.id, false).await.unwrap() {
            RunOutcome::Completed(done) => done,
            other => panic!("unexpected outcome {:?}", other),
        };

        assert_eq!(&h.ops.calls()[..2], &["render_sequence", "extract"]);
        let video = done.result_video_url.unwrap();
        assert!(video.starts_with("memory://capflow/cache/sequence/"));
    }

    #[tokio::test]
    async fn test_burn_in_delivers_the_composited_video() {
        let h = Harness::new();
        let job = h.insert(Job::from_url("owner-1", SOURCE).with_burn_in(true)).await;

        let done = match h.executor.run(&job.id, false).await.unwrap() {
            RunOutcome::Completed(done) => done,
            other => panic!("unexpected outcome {:?}", other),
        };

        assert_eq!(h.ops.count("composite"), 1);
        let video = done.result_video_url.unwrap();
        assert!(video.starts_with(&format!("memory://capflow/results/videos/{}.mp4?expires=", job.id)));
    }

    #[tokio::test]
    async fn test_composite_failure_keeps_its_step() {
        let h = Harness::with_ops(|ops| ops.failing("composite"));
        let job = h.insert(Job::from_url("owner-1", SOURCE).with_burn_in(true)).await;

        let outcome = h.executor.run(&job.id, false).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed { stage: Stage::Composite, .. }));

        let failed = h.job(&job.id).await;
        assert_eq!(failed.step, Some(JobStep::Composite));
        assert_eq!(failed.progress, 0.90);
    }

    #[test]
    fn test_plan_adds_composite_only_for_burn_in() {
        let plain = Job::from_url("o", SOURCE);
        assert!(!Stage::plan(&plain).contains(&Stage::Composite));
        assert_eq!(Stage::plan(&plain).last(), Some(&Stage::Deliver));

        let burned = plain.with_burn_in(true);
        let plan = Stage::plan(&burned);
        assert_eq!(plan[plan.len() - 2], Stage::Composite);
    }
}
