//! Type-specific job parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::job::JobType;
use crate::render::{ClipWindow, RenderTier, VideoFormat};

/// Parameters of a job, tagged by job type.
///
/// The tag is serialized as the job's `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    Upload(UploadPayload),
    GenerateVideo(VideoPayload),
    GenerateShort(ShortPayload),
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::Upload(_) => JobType::Upload,
            JobPayload::GenerateVideo(_) => JobType::GenerateVideo,
            JobPayload::GenerateShort(_) => JobType::GenerateShort,
        }
    }

    /// Files the handler reads.
    pub fn input_paths(&self) -> Vec<&Path> {
        match self {
            JobPayload::Upload(p) => vec![p.file_path.as_path()],
            JobPayload::GenerateVideo(p) => vec![p.audio_path.as_path(), p.image_path.as_path()],
            JobPayload::GenerateShort(p) => vec![p.audio_path.as_path(), p.image_path.as_path()],
        }
    }
}

/// Where an upload job publishes its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum UploadDestination {
    /// Podcast hosting site (credentialed, returns success/failure)
    #[default]
    Hosting,
    /// Video platform (returns a public URL)
    VideoPlatform,
}

/// Visibility requested from the video platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Private,
    Unlisted,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Unlisted => "unlisted",
            Visibility::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UploadPayload {
    pub file_path: PathBuf,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub destination: UploadDestination,
    #[serde(default)]
    pub visibility: Visibility,
}

/// Full-episode video render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoPayload {
    pub audio_path: PathBuf,
    pub image_path: PathBuf,
    #[serde(default)]
    pub format: VideoFormat,
    #[serde(default)]
    pub tier: RenderTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<BackgroundColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
}

/// Vertical short rendered from a window of the episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShortPayload {
    pub audio_path: PathBuf,
    pub image_path: PathBuf,
    /// Clip start offset in seconds
    pub start_time: f64,
    /// Requested clip length in seconds
    pub duration: f64,
    #[serde(default)]
    pub tier: RenderTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<BackgroundColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
}

impl ShortPayload {
    pub fn clip_window(&self) -> ClipWindow {
        ClipWindow::new(self.start_time, self.duration)
    }
}

/// Solid colour, written as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackgroundColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl BackgroundColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// FFmpeg colour syntax (`0xRRGGBB`).
    pub fn to_ffmpeg(&self) -> String {
        format!("0x{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl Default for BackgroundColor {
    fn default() -> Self {
        crate::encoding::DEFAULT_BACKGROUND
    }
}

impl JsonSchema for BackgroundColor {
    fn schema_name() -> String {
        "BackgroundColor".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for BackgroundColor {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim();
        let hex = hex
            .strip_prefix('#')
            .or_else(|| hex.strip_prefix("0x"))
            .unwrap_or(hex);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorParseError(s.to_string()));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ColorParseError(s.to_string()))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl TryFrom<String> for BackgroundColor {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackgroundColor> for String {
    fn from(value: BackgroundColor) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Error)]
#[error("Invalid colour (expected #RRGGBB): {0}")]
pub struct ColorParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_parse() {
        let c: BackgroundColor = "#1E1E1E".parse().unwrap();
        assert_eq!(c, BackgroundColor::new(0x1e, 0x1e, 0x1e));
        assert_eq!(c.to_ffmpeg(), "0x1E1E1E");
        assert_eq!("0a0a0a".parse::<BackgroundColor>().unwrap().to_string(), "#0A0A0A");
        assert!("#12345".parse::<BackgroundColor>().is_err());
        assert!("#GG0000".parse::<BackgroundColor>().is_err());
    }

    #[test]
    fn test_short_payload_from_json() {
        let json = r##"{
            "type": "generate_short",
            "audio_path": "inbox/ep.mp3",
            "image_path": "inbox/cover.png",
            "start_time": 12.5,
            "duration": 58,
            "tier": "quality",
            "background_color": "#101010"
        }"##;
        let payload: JobPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.job_type(), JobType::GenerateShort);
        match payload {
            JobPayload::GenerateShort(p) => {
                assert_eq!(p.tier, RenderTier::Quality);
                assert_eq!(p.clip_window(), ClipWindow::new(12.5, 58.0));
                assert_eq!(p.background_color, Some(BackgroundColor::new(16, 16, 16)));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_video_payload_defaults() {
        let json = r#"{"type":"generate_video","audio_path":"a.mp3","image_path":"c.png"}"#;
        let payload: JobPayload = serde_json::from_str(json).unwrap();
        match payload {
            JobPayload::GenerateVideo(p) => {
                assert_eq!(p.format, VideoFormat::Square);
                assert_eq!(p.tier, RenderTier::Balanced);
                assert!(p.background_color.is_none());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_upload_input_paths() {
        let payload = JobPayload::Upload(UploadPayload {
            file_path: "inbox/ep.mp3".into(),
            title: "t".into(),
            description: String::new(),
            destination: UploadDestination::VideoPlatform,
            visibility: Visibility::Unlisted,
        });
        assert_eq!(payload.input_paths(), vec![Path::new("inbox/ep.mp3")]);
    }
}
