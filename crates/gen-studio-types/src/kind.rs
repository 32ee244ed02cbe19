use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GenError;

/// The fixed set of generation pipelines the server can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "generative_art")]
    Art,
    #[serde(rename = "generative_video")]
    Video,
    #[serde(rename = "streaming_generative")]
    Streaming,
}

/// What a pipeline of a given kind produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Image,
    Video,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Art, ModelKind::Video, ModelKind::Streaming];

    /// Name used on the wire by the HTTP API (`model_type` fields, status keys).
    pub fn wire_name(self) -> &'static str {
        match self {
            ModelKind::Art => "generative_art",
            ModelKind::Video => "generative_video",
            ModelKind::Streaming => "streaming_generative",
        }
    }

    /// Identifier of the upstream model backing this kind.
    pub fn model_id(self) -> &'static str {
        match self {
            ModelKind::Art => "prompthero/openjourney",
            ModelKind::Video => "ByteDance/AnimateDiff-Lightning",
            ModelKind::Streaming => "stabilityai/sdxl-turbo",
        }
    }

    /// Position in [`ModelKind::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn output(self) -> OutputKind {
        match self {
            ModelKind::Art | ModelKind::Streaming => OutputKind::Image,
            ModelKind::Video => OutputKind::Video,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for ModelKind {
    type Err = GenError;

    /// Accepts both the wire names and the short names (`art`, `video`, `streaming`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "generative_art" | "art" => Ok(ModelKind::Art),
            "generative_video" | "video" => Ok(ModelKind::Video),
            "streaming_generative" | "streaming" => Ok(ModelKind::Streaming),
            other => Err(GenError::UnknownModelKind(other.to_string())),
        }
    }
}

/// Lifecycle state of a model slot.
///
/// `Unloaded -> Loading -> Loaded -> Unloading -> Unloaded`; a failed load
/// goes straight from `Loading` back to `Unloaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Unloading,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotState::Unloaded => "unloaded",
            SlotState::Loading => "loading",
            SlotState::Loaded => "loaded",
            SlotState::Unloading => "unloading",
        };
        f.write_str(name)
    }
}

/// Container format used for generated videos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    Mp4,
    Gif,
}

impl VideoFormat {
    pub fn extension(self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Gif => "gif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "video/mp4",
            VideoFormat::Gif => "image/gif",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" => Some(VideoFormat::Mp4),
            "gif" => Some(VideoFormat::Gif),
            _ => None,
        }
    }
}

impl FromStr for VideoFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VideoFormat::from_extension(s.trim()).ok_or_else(|| format!("unsupported video format '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wire_and_short_names() {
        assert_eq!("generative_art".parse::<ModelKind>().unwrap(), ModelKind::Art);
        assert_eq!("video".parse::<ModelKind>().unwrap(), ModelKind::Video);
        assert_eq!(
            " streaming_generative ".parse::<ModelKind>().unwrap(),
            ModelKind::Streaming
        );
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = "text".parse::<ModelKind>().unwrap_err();
        assert_eq!(err, GenError::UnknownModelKind("text".to_string()));
    }

    #[test]
    fn test_kind_serializes_as_wire_name() {
        let json = serde_json::to_string(&ModelKind::Video).unwrap();
        assert_eq!(json, "\"generative_video\"");
        let back: ModelKind = serde_json::from_str("\"streaming_generative\"").unwrap();
        assert_eq!(back, ModelKind::Streaming);
    }

    #[test]
    fn test_output_kinds() {
        assert_eq!(ModelKind::Art.output(), OutputKind::Image);
        assert_eq!(ModelKind::Streaming.output(), OutputKind::Image);
        assert_eq!(ModelKind::Video.output(), OutputKind::Video);
    }

    #[test]
    fn test_index_matches_all_order() {
        for (i, kind) in ModelKind::ALL.into_iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_video_format_extension_lookup() {
        assert_eq!(VideoFormat::from_extension("MP4"), Some(VideoFormat::Mp4));
        assert_eq!(VideoFormat::from_extension("webm"), None);
        assert_eq!("gif".parse::<VideoFormat>().unwrap(), VideoFormat::Gif);
    }
}
