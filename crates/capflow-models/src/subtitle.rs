//! Subtitle styling and caption documents.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Vertical placement of rendered subtitles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubtitlePosition {
    Top,
    Center,
    #[default]
    Bottom,
}

/// Subtitle style applied when generating and compositing subtitles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SubtitleConfig {
    pub font_name: String,
    /// Font size in points
    pub font_size: u32,
    pub font_weight: String,
    /// Hex color, e.g. `#FFFFFF`
    pub primary_color: String,
    pub outline_color: String,
    pub background_color: String,
    pub outline_width: u32,
    pub position: SubtitlePosition,
    /// Show source text above the translation
    pub show_bilingual: bool,
    /// Vertical margin in pixels
    pub margin_v: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            font_name: "Arial".to_string(),
            font_size: 24,
            font_weight: "normal".to_string(),
            primary_color: "#FFFFFF".to_string(),
            outline_color: "#000000".to_string(),
            background_color: "#00000080".to_string(),
            outline_width: 2,
            position: SubtitlePosition::Bottom,
            show_bilingual: false,
            margin_v: 100,
            effect: None,
        }
    }
}

/// Word-level timing inside a cue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// A single subtitle line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleCue {
    pub id: u32,
    /// Start time in seconds
    pub start_time: f64,
    /// End time in seconds
    pub end_time: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<WordTiming>,
}

/// Caption document stored as `captionSource` / `captionEdit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaptionData {
    #[serde(default = "caption_version")]
    pub version: u32,
    pub cues: Vec<SubtitleCue>,
    pub default_style: SubtitleConfig,
}

fn caption_version() -> u32 {
    1
}

impl CaptionData {
    pub fn new(cues: Vec<SubtitleCue>, default_style: SubtitleConfig) -> Self {
        Self {
            version: caption_version(),
            cues,
            default_style,
        }
    }
}
