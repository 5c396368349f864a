//! HTTP client for the media service.
//!
//! The media service downloads sources, runs ffmpeg, speech-to-text and
//! translation models, and writes rendered artifacts straight into object
//! storage at the keys it is given.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use capflow_models::{SequenceClip, SubtitleConfig, VideoCut};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::ops::{
    ExtractedMedia, MediaOps, MediaSource, RenderedArtifact, SpeechToText, SubtitleDocument, TranscriptSegment,
    Transcription, Translator,
};

/// Segments sent per translation request.
pub const TRANSLATION_CHUNK_SIZE: usize = 25;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractRequest<'a> {
    source: &'a MediaSource,
}

#[derive(Serialize)]
struct CutSpan {
    start: f64,
    end: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrimRequest<'a> {
    audio_url: &'a str,
    cuts: Vec<CutSpan>,
    output_key: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SequenceRequest<'a> {
    clips: &'a [SequenceClip],
    output_key: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompositeRequest<'a> {
    video_url: &'a str,
    srt: &'a str,
    style: &'a SubtitleConfig,
    output_key: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscribeRequest<'a> {
    audio_url: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateRequest<'a> {
    target_locale: &'a str,
    segments: &'a [TranscriptSegment],
}

#[derive(Deserialize)]
struct TranslateResponse {
    segments: Vec<TranslatedText>,
}

#[derive(Deserialize)]
struct TranslatedText {
    #[serde(default)]
    id: Option<u32>,
    text: String,
}

#[derive(Clone)]
pub struct MediaServiceClient {
    base_url: String,
    client: Client,
}

impl MediaServiceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> WorkerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkerError::config_error(format!("Failed to build media service client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &WorkerConfig) -> WorkerResult<Self> {
        Self::new(config.media_service_url.clone(), config.media_service_timeout)
    }

    async fn post<B, R>(&self, op: &'static str, path: &str, body: &B) -> WorkerResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(op, url = %url, "Calling media service");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| WorkerError::stage(format!("{} request failed: {}", op, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::stage(format!(
                "{} failed with status {}: {}",
                op,
                status.as_u16(),
                body.trim()
            )));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| WorkerError::stage(format!("{} returned an invalid response: {}", op, e)))
    }

    async fn translate_chunk(&self, chunk: &[TranscriptSegment], target_locale: &str) -> WorkerResult<Vec<TranscriptSegment>> {
        let response: TranslateResponse = self
            .post(
                "translate",
                "/v1/translate",
                &TranslateRequest {
                    target_locale,
                    segments: chunk,
                },
            )
            .await?;

        if response.segments.len() != chunk.len() {
            return Err(WorkerError::stage(format!(
                "translate returned {} segments for {}",
                response.segments.len(),
                chunk.len()
            )));
        }

        Ok(chunk
            .iter()
            .zip(response.segments)
            .map(|(source, translated)| TranscriptSegment {
                id: translated.id.unwrap_or(source.id),
                start: source.start,
                end: source.end,
                text: translated.text.trim().to_string(),
                words: Vec::new(),
            })
            .collect())
    }
}

#[async_trait]
impl MediaOps for MediaServiceClient {
    async fn extract_audio(&self, source: &MediaSource) -> WorkerResult<ExtractedMedia> {
        self.post("extract", "/v1/extract", &ExtractRequest { source }).await
    }

    async fn trim_audio(&self, audio_url: &str, cuts: &[VideoCut], output_key: &str) -> WorkerResult<RenderedArtifact> {
        let mut spans: Vec<CutSpan> = cuts.iter().map(|c| CutSpan { start: c.start, end: c.end }).collect();
        spans.sort_by(|a, b| a.start.total_cmp(&b.start));
        self.post(
            "trim",
            "/v1/trim",
            &TrimRequest {
                audio_url,
                cuts: spans,
                output_key,
            },
        )
        .await
    }

    async fn render_sequence(&self, clips: &[SequenceClip], output_key: &str) -> WorkerResult<RenderedArtifact> {
        let mut ordered = clips.to_vec();
        ordered.sort_by_key(|c| c.order);
        self.post(
            "render_sequence",
            "/v1/sequence",
            &SequenceRequest {
                clips: &ordered,
                output_key,
            },
        )
        .await
    }

    async fn composite(
        &self,
        video_url: &str,
        subtitles: &SubtitleDocument,
        output_key: &str,
    ) -> WorkerResult<RenderedArtifact> {
        self.post(
            "composite",
            "/v1/composite",
            &CompositeRequest {
                video_url,
                srt: &subtitles.srt,
                style: &subtitles.caption.default_style,
                output_key,
            },
        )
        .await
    }
}

#[async_trait]
impl SpeechToText for MediaServiceClient {
    async fn transcribe(&self, audio_url: &str) -> WorkerResult<Transcription> {
        self.post("transcribe", "/v1/transcribe", &TranscribeRequest { audio_url })
            .await
    }
}

#[async_trait]
impl Translator for MediaServiceClient {
    /// Translates in chunks; a failed chunk keeps its original text.
    async fn translate(&self, segments: &[TranscriptSegment], target_locale: &str) -> WorkerResult<Vec<TranscriptSegment>> {
        let mut translated = Vec::with_capacity(segments.len());
        let total_chunks = segments.len().div_ceil(TRANSLATION_CHUNK_SIZE);

        for (index, chunk) in segments.chunks(TRANSLATION_CHUNK_SIZE).enumerate() {
            match self.translate_chunk(chunk, target_locale).await {
                Ok(segments) => translated.extend(segments),
                Err(e) => {
                    warn!(
                        chunk = index + 1,
                        total_chunks,
                        error = %e,
                        "Translation chunk failed, keeping original text"
                    );
                    translated.extend(chunk.iter().cloned());
                }
            }
        }

        Ok(translated)
    }
}
