//! Stage operation contracts.
//!
//! Extraction, transcription, translation and rendering run in external
//! services; the executor only depends on these traits. Subtitle generation
//! is local (see `subtitles`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use capflow_models::{CaptionData, SequenceClip, SubtitleConfig, VideoCut, WordTiming};

use crate::error::WorkerResult;

/// Where a job's media comes from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaSource {
    /// Remote or signed URL
    Url(String),
    /// Stored asset, resolved by the media service
    #[serde(rename = "assetId")]
    Asset(String),
}

/// Audio extracted from a source, plus the playable video when there is one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedMedia {
    pub audio_url: String,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

/// Output written by a media operation at the requested storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedArtifact {
    pub storage_key: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub id: u32,
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<WordTiming>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcription {
    #[serde(default)]
    pub language: Option<String>,
    pub segments: Vec<TranscriptSegment>,
}

/// Generated subtitles: the SRT file and the editor document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleDocument {
    pub file_name: String,
    pub srt: String,
    pub caption: CaptionData,
}

/// Media extraction and rendering.
#[async_trait]
pub trait MediaOps: Send + Sync {
    async fn extract_audio(&self, source: &MediaSource) -> WorkerResult<ExtractedMedia>;

    /// Concatenate the kept segments of `audio_url` into `output_key`.
    async fn trim_audio(&self, audio_url: &str, cuts: &[VideoCut], output_key: &str) -> WorkerResult<RenderedArtifact>;

    /// Render the clips, in order, into one video at `output_key`.
    async fn render_sequence(&self, clips: &[SequenceClip], output_key: &str) -> WorkerResult<RenderedArtifact>;

    /// Burn subtitles into the video at `output_key`.
    async fn composite(
        &self,
        video_url: &str,
        subtitles: &SubtitleDocument,
        output_key: &str,
    ) -> WorkerResult<RenderedArtifact>;
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio_url: &str) -> WorkerResult<Transcription>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// One translated segment per input segment, same timing.
    async fn translate(&self, segments: &[TranscriptSegment], target_locale: &str) -> WorkerResult<Vec<TranscriptSegment>>;
}

/// Builds subtitle documents from transcribed and translated segments.
pub trait SubtitleGenerator: Send + Sync {
    /// `cuts` maps cue times from the trimmed timeline back to the source.
    fn generate(
        &self,
        original: &[TranscriptSegment],
        translated: &[TranscriptSegment],
        style: &SubtitleConfig,
        cuts: Option<&[VideoCut]>,
    ) -> WorkerResult<SubtitleDocument>;
}
