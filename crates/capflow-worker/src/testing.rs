//! Fakes shared by the executor and service tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use capflow_firestore::{FirestoreResult, JobStore, MemoryStore, Stores, Transition};
use capflow_models::{
    Job, JobFilter, JobId, JobPage, JobPatch, JobStatus, SequenceClip, StatusCounts, VideoCut, WebhookEvent,
};
use capflow_storage::{MemoryStorage, ObjectStorage};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::executor::{PipelineExecutor, StageOps};
use crate::media_cache::MediaCacheService;
use crate::notifier::Notifier;
use crate::ops::{
    ExtractedMedia, MediaOps, MediaSource, RenderedArtifact, SpeechToText, SubtitleDocument, Transcription,
    TranscriptSegment, Translator,
};
use crate::subtitles::SrtSubtitleGenerator;

pub(crate) fn segment(id: u32, start: f64, end: f64, text: &str) -> TranscriptSegment {
    TranscriptSegment {
        id,
        start,
        end,
        text: text.to_string(),
        words: vec![],
    }
}

/// Media, speech and translation in one fake; artifacts land in `storage`.
pub(crate) struct FakeOps {
    storage: Arc<MemoryStorage>,
    calls: Mutex<Vec<&'static str>>,
    fail_on: Option<&'static str>,
    transcribe_gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl FakeOps {
    pub fn new(storage: Arc<MemoryStorage>) -> Self {
        Self {
            storage,
            calls: Mutex::new(Vec::new()),
            fail_on: None,
            transcribe_gate: None,
        }
    }

    /// Make operation `op` fail.
    pub fn failing(mut self, op: &'static str) -> Self {
        self.fail_on = Some(op);
        self
    }

    /// Signal `entered` when transcription starts, then wait for `release`.
    pub fn gated(mut self, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        self.transcribe_gate = Some((entered, release));
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| **c == op).count()
    }

    fn enter(&self, op: &'static str) -> WorkerResult<()> {
        self.calls.lock().unwrap().push(op);
        if self.fail_on == Some(op) {
            return Err(WorkerError::stage(format!("{} unavailable", op)));
        }
        Ok(())
    }

    async fn write(&self, key: &str, content_type: &str) -> WorkerResult<RenderedArtifact> {
        self.storage.put(b"media".to_vec(), key, content_type).await?;
        Ok(RenderedArtifact {
            storage_key: key.to_string(),
            size_bytes: Some(5),
            duration_ms: None,
        })
    }
}

#[async_trait]
impl MediaOps for FakeOps {
    async fn extract_audio(&self, source: &MediaSource) -> WorkerResult<ExtractedMedia> {
        self.enter("extract")?;
        let name = match source {
            MediaSource::Url(url) => url.rsplit('/').next().unwrap_or("source").to_string(),
            MediaSource::Asset(id) => id.clone(),
        };
        Ok(ExtractedMedia {
            audio_url: format!("https://media.test/audio/{}.mp3", name),
            video_url: Some(format!("https://media.test/video/{}.mp4", name)),
            duration_ms: Some(4_000),
        })
    }

    async fn trim_audio(&self, _audio_url: &str, _cuts: &[VideoCut], output_key: &str) -> WorkerResult<RenderedArtifact> {
        self.enter("trim")?;
        self.write(output_key, "audio/mpeg").await
    }

    async fn render_sequence(&self, _clips: &[SequenceClip], output_key: &str) -> WorkerResult<RenderedArtifact> {
        self.enter("render_sequence")?;
        self.write(output_key, "video/mp4").await
    }

    async fn composite(
        &self,
        _video_url: &str,
        _subtitles: &SubtitleDocument,
        output_key: &str,
    ) -> WorkerResult<RenderedArtifact> {
        self.enter("composite")?;
        self.write(output_key, "video/mp4").await
    }
}

#[async_trait]
impl SpeechToText for FakeOps {
    async fn transcribe(&self, _audio_url: &str) -> WorkerResult<Transcription> {
        if let Some((entered, release)) = &self.transcribe_gate {
            entered.notify_one();
            release.notified().await;
        }
        self.enter("transcribe")?;
        Ok(Transcription {
            language: Some("en".to_string()),
            segments: vec![segment(1, 0.0, 2.0, "hello"), segment(2, 2.5, 4.0, "world")],
        })
    }
}

#[async_trait]
impl Translator for FakeOps {
    async fn translate(&self, segments: &[TranscriptSegment], target_locale: &str) -> WorkerResult<Vec<TranscriptSegment>> {
        self.enter("translate")?;
        Ok(segments
            .iter()
            .map(|s| TranscriptSegment {
                text: format!("[{}] {}", target_locale, s.text),
                ..s.clone()
            })
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    events: Mutex<Vec<(String, WebhookEvent)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<WebhookEvent> {
        self.events.lock().unwrap().iter().map(|(_, e)| *e).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn trigger(&self, owner_id: &str, event: WebhookEvent, _data: serde_json::Value) {
        self.events.lock().unwrap().push((owner_id.to_string(), event));
    }
}

/// Job store that records every applied status change.
pub(crate) struct AuditedJobs {
    inner: MemoryStore,
    transitions: Mutex<Vec<(JobStatus, JobStatus)>>,
}

impl AuditedJobs {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            transitions: Mutex::new(Vec::new()),
        }
    }

    pub fn transitions(&self) -> Vec<(JobStatus, JobStatus)> {
        self.transitions.lock().unwrap().clone()
    }

    fn record(&self, before: JobStatus, after: JobStatus) {
        if before != after {
            self.transitions.lock().unwrap().push((before, after));
        }
    }
}

#[async_trait]
impl JobStore for AuditedJobs {
    async fn insert(&self, job: &Job) -> FirestoreResult<()> {
        JobStore::insert(&self.inner, job).await
    }

    async fn get(&self, id: &JobId) -> FirestoreResult<Option<Job>> {
        JobStore::get(&self.inner, id).await
    }

    async fn insert_draft(&self, job: Job, queue_id: &str) -> FirestoreResult<Job> {
        self.inner.insert_draft(job, queue_id).await
    }

    async fn update_if_status(
        &self,
        id: &JobId,
        expected: &[JobStatus],
        patch: &JobPatch,
    ) -> FirestoreResult<Transition<Job>> {
        let before = JobStore::get(&self.inner, id).await?.map(|j| j.status);
        let result = self.inner.update_if_status(id, expected, patch).await?;
        if let (Some(before), Transition::Applied(job)) = (before, &result) {
            self.record(before, job.status);
        }
        Ok(result)
    }

    async fn update_all_if_status(
        &self,
        ids: &[JobId],
        expected: &[JobStatus],
        patch: &JobPatch,
    ) -> FirestoreResult<Transition<Vec<Job>>> {
        let mut before = Vec::new();
        for id in ids {
            before.push(JobStore::get(&self.inner, id).await?.map(|j| j.status));
        }
        let result = self.inner.update_all_if_status(ids, expected, patch).await?;
        if let Transition::Applied(jobs) = &result {
            for (prev, job) in before.into_iter().zip(jobs) {
                if let Some(prev) = prev {
                    self.record(prev, job.status);
                }
            }
        }
        Ok(result)
    }

    async fn delete(&self, id: &JobId) -> FirestoreResult<bool> {
        self.inner.delete(id).await
    }

    async fn list(&self, filter: &JobFilter) -> FirestoreResult<JobPage> {
        self.inner.list(filter).await
    }

    async fn count_by_status(&self, owner_id: &str) -> FirestoreResult<StatusCounts> {
        self.inner.count_by_status(owner_id).await
    }

    async fn queue_jobs(&self, queue_id: &str, status: Option<JobStatus>) -> FirestoreResult<Vec<Job>> {
        self.inner.queue_jobs(queue_id, status).await
    }

    async fn count_created_since(&self, owner_id: &str, since: DateTime<Utc>) -> FirestoreResult<u64> {
        self.inner.count_created_since(owner_id, since).await
    }

    async fn stale(&self, statuses: &[JobStatus], updated_before: DateTime<Utc>) -> FirestoreResult<Vec<Job>> {
        self.inner.stale(statuses, updated_before).await
    }
}

/// An executor wired to in-memory stores and fakes.
pub(crate) struct Harness {
    pub store: MemoryStore,
    pub jobs: Arc<AuditedJobs>,
    pub storage: Arc<MemoryStorage>,
    pub ops: Arc<FakeOps>,
    pub notifier: Arc<RecordingNotifier>,
    pub executor: Arc<PipelineExecutor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_ops(|ops| ops)
    }

    pub fn with_ops(configure: impl FnOnce(FakeOps) -> FakeOps) -> Self {
        let store = MemoryStore::new();
        let jobs = Arc::new(AuditedJobs::new(store.clone()));
        let storage = Arc::new(MemoryStorage::default());
        let ops = Arc::new(configure(FakeOps::new(storage.clone())));
        let notifier = Arc::new(RecordingNotifier::default());
        let config = WorkerConfig::default();

        let cache = MediaCacheService::new(Arc::new(store.clone()), storage.clone(), Duration::from_secs(600));
        let stage_ops = StageOps {
            media: ops.clone(),
            stt: ops.clone(),
            translator: ops.clone(),
            subtitles: Arc::new(SrtSubtitleGenerator::new()),
        };
        let executor = Arc::new(PipelineExecutor::new(
            jobs.clone(),
            storage.clone(),
            cache,
            stage_ops,
            notifier.clone(),
            config,
        ));

        Self {
            store,
            jobs,
            storage,
            ops,
            notifier,
            executor,
        }
    }

    /// Stores sharing this harness's job audit.
    pub fn stores(&self) -> Stores {
        let store = Arc::new(self.store.clone());
        Stores {
            jobs: self.jobs.clone(),
            queues: store.clone(),
            media_cache: store.clone(),
            plans: store.clone(),
            webhooks: store,
        }
    }

    pub async fn insert(&self, job: Job) -> Job {
        JobStore::insert(self.jobs.as_ref(), &job).await.unwrap();
        job
    }

    pub async fn job(&self, id: &JobId) -> Job {
        JobStore::get(self.jobs.as_ref(), id).await.unwrap().unwrap()
    }

    /// Poll until the job reaches a terminal status.
    pub async fn wait_terminal(&self, id: &JobId) -> Job {
        for _ in 0..200 {
            let job = self.job(id).await;
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} never reached a terminal status", id);
    }
}
