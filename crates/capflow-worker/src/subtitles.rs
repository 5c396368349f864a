//! Local SRT subtitle generation.
//!
//! Cues take their timing from the translated segments. When the audio was
//! trimmed, cue and word times are mapped back onto the source timeline so
//! the delivered file lines up with the original media.

use uuid::Uuid;

use capflow_models::{map_trimmed_to_original, CaptionData, SubtitleConfig, SubtitleCue, VideoCut, WordTiming};

use crate::error::{WorkerError, WorkerResult};
use crate::ops::{SubtitleDocument, SubtitleGenerator, TranscriptSegment};

#[derive(Debug, Clone, Copy, Default)]
pub struct SrtSubtitleGenerator;

impl SrtSubtitleGenerator {
    pub fn new() -> Self {
        Self
    }
}

/// `HH:MM:SS,mmm`
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, ms)
}

/// Render cues as an SRT file, numbering from 1.
pub fn render_srt(cues: &[SubtitleCue]) -> String {
    cues.iter()
        .enumerate()
        .map(|(i, cue)| {
            format!(
                "{}\n{} --> {}\n{}\n",
                i + 1,
                format_timestamp(cue.start_time),
                format_timestamp(cue.end_time),
                cue.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl SubtitleGenerator for SrtSubtitleGenerator {
    fn generate(
        &self,
        original: &[TranscriptSegment],
        translated: &[TranscriptSegment],
        style: &SubtitleConfig,
        cuts: Option<&[VideoCut]>,
    ) -> WorkerResult<SubtitleDocument> {
        if translated.is_empty() {
            return Err(WorkerError::stage("No speech segments to build subtitles from"));
        }

        let to_source = |t: f64| match cuts {
            Some(cuts) if !cuts.is_empty() => map_trimmed_to_original(t, cuts),
            _ => t,
        };

        let cues: Vec<SubtitleCue> = translated
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                let source = original.get(i);
                let original_text = source.map(|s| s.text.trim().to_string());
                let translated_text = segment.text.trim();

                let text = match (&original_text, style.show_bilingual) {
                    (Some(orig), true) => format!("{}\n{}", orig, translated_text),
                    _ => translated_text.to_string(),
                };

                let words = source
                    .map(|s| {
                        s.words
                            .iter()
                            .map(|w| WordTiming {
                                word: w.word.clone(),
                                start: to_source(w.start),
                                end: to_source(w.end),
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                SubtitleCue {
                    id: i as u32 + 1,
                    start_time: to_source(segment.start),
                    end_time: to_source(segment.end),
                    text,
                    original_text,
                    words,
                }
            })
            .collect();

        let suffix = if style.show_bilingual { "-bilingual" } else { "" };
        let id = Uuid::new_v4().simple().to_string();
        Ok(SubtitleDocument {
            file_name: format!("subtitles-{}{}.srt", &id[..8], suffix),
            srt: render_srt(&cues),
            caption: CaptionData::new(cues, style.clone()),
        })
    }
}
