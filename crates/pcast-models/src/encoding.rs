//! Video encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::payload::BackgroundColor;
use crate::render::RenderTier;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";
/// Pixel format for player compatibility
pub const PIXEL_FORMAT: &str = "yuv420p";

/// Background used when a job does not name a colour
pub const DEFAULT_BACKGROUND: BackgroundColor = BackgroundColor::new(0x0A, 0x0A, 0x0A);

/// Waveform band height for square/landscape outputs
pub const WAVEFORM_HEIGHT: u32 = 180;
/// Waveform band height for vertical outputs
pub const WAVEFORM_HEIGHT_TALL: u32 = 260;
/// Gap between the waveform band and the bottom edge
pub const WAVEFORM_BOTTOM_MARGIN: u32 = 80;

/// Gaussian blur strength for the quality background
pub const QUALITY_BLUR_SIGMA: u32 = 30;
/// Downscale divisor for the balanced soft blur
pub const BALANCED_BLUR_DIVISOR: u32 = 16;

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "ultrafast", "medium")
    pub preset: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    pub crf: u8,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self::for_tier(RenderTier::default())
    }
}

impl EncodingConfig {
    /// Encoder settings for a render tier.
    pub fn for_tier(tier: RenderTier) -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: tier.preset().to_string(),
            crf: tier.crf(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
        }
    }

    /// Convert to FFmpeg command arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            PIXEL_FORMAT.to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]
    }
}
