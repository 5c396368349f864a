//! Edit decisions: kept segments and multi-asset sequences.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A segment of the source to KEEP, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoCut {
    /// Client-side identifier; not part of the cut's meaning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub start: f64,
    pub end: f64,
}

impl VideoCut {
    pub fn new(start: f64, end: f64) -> Self {
        Self { id: None, start, end }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Map a time on the trimmed timeline (kept segments played back to back)
/// to the original source timeline.
pub fn map_trimmed_to_original(trimmed_time: f64, cuts: &[VideoCut]) -> f64 {
    let mut sorted: Vec<&VideoCut> = cuts.iter().collect();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut accumulated = 0.0;
    for cut in &sorted {
        let duration = cut.duration();
        if trimmed_time <= accumulated + duration {
            return cut.start + (trimmed_time - accumulated);
        }
        accumulated += duration;
    }

    sorted.last().map(|c| c.end).unwrap_or(trimmed_time)
}

/// One clip of an edit sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SequenceClip {
    #[serde(default)]
    pub id: String,
    pub asset_id: String,
    /// Start time within the asset (seconds)
    pub start_time: f64,
    /// End time within the asset (seconds)
    pub end_time: f64,
    /// Position in the sequence
    #[serde(default)]
    pub order: i64,
    /// Playback speed multiplier (default 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum SequenceLayerType {
    #[default]
    Video,
    Audio,
    Caption,
}

/// A single timeline of a layered sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SequenceLayer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub layer_type: SequenceLayerType,
    #[serde(default)]
    pub clips: Vec<SequenceClip>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,
}

/// Layered sequence document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SequenceData {
    #[serde(default = "default_sequence_version")]
    pub version: u32,
    pub active_layer_id: String,
    #[serde(default)]
    pub layers: Vec<SequenceLayer>,
}

fn default_sequence_version() -> u32 {
    2
}

/// Either a bare clip list or a layered sequence document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Sequence {
    Clips(Vec<SequenceClip>),
    Layered(SequenceData),
}

impl Sequence {
    /// Clips of the designated layer: the active layer, else the first one.
    pub fn active_clips(&self) -> &[SequenceClip] {
        match self {
            Sequence::Clips(clips) => clips,
            Sequence::Layered(data) => data
                .layers
                .iter()
                .find(|layer| layer.id == data.active_layer_id)
                .or_else(|| data.layers.first())
                .map(|layer| layer.clips.as_slice())
                .unwrap_or(&[]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.active_clips().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(id: &str, order: i64) -> SequenceClip {
        SequenceClip {
            id: id.to_string(),
            asset_id: format!("asset-{}", id),
            start_time: 0.0,
            end_time: 5.0,
            order,
            speed: None,
        }
    }

    #[test]
    fn test_active_clips_prefers_active_layer() {
        let seq = Sequence::Layered(SequenceData {
            version: 2,
            active_layer_id: "b".to_string(),
            layers: vec![
                SequenceLayer {
                    id: "a".to_string(),
                    name: "A".to_string(),
                    layer_type: SequenceLayerType::Video,
                    clips: vec![clip("1", 0)],
                    is_visible: None,
                },
                SequenceLayer {
                    id: "b".to_string(),
                    name: "B".to_string(),
                    layer_type: SequenceLayerType::Video,
                    clips: vec![clip("2", 0), clip("3", 1)],
                    is_visible: None,
                },
            ],
        });
        assert_eq!(seq.active_clips().len(), 2);
    }

    #[test]
    fn test_active_clips_falls_back_to_first_layer() {
        let seq = Sequence::Layered(SequenceData {
            version: 2,
            active_layer_id: "missing".to_string(),
            layers: vec![SequenceLayer {
                id: "a".to_string(),
                name: String::new(),
                layer_type: SequenceLayerType::Video,
                clips: vec![clip("1", 0)],
                is_visible: None,
            }],
        });
        assert_eq!(seq.active_clips()[0].id, "1");
    }

    #[test]
    fn test_sequence_deserializes_both_shapes() {
        let plain: Sequence =
            serde_json::from_str(r#"[{"id":"c","assetId":"x","startTime":0,"endTime":2,"order":0}]"#).unwrap();
        assert!(matches!(plain, Sequence::Clips(_)));

        let layered: Sequence = serde_json::from_str(
            r#"{"version":2,"activeLayerId":"l","layers":[{"id":"l","name":"L","type":"video","clips":[]}]}"#,
        )
        .unwrap();
        assert!(matches!(layered, Sequence::Layered(_)));
        assert!(layered.is_empty());
    }

    #[test]
    fn test_map_trimmed_to_original() {
        let cuts = vec![VideoCut::new(10.0, 20.0), VideoCut::new(0.0, 5.0)];
        assert_eq!(map_trimmed_to_original(2.0, &cuts), 2.0);
        assert_eq!(map_trimmed_to_original(7.0, &cuts), 12.0);
        assert_eq!(map_trimmed_to_original(100.0, &cuts), 20.0);
    }
}
