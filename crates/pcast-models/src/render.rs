//! Render parameters: tiers, output formats, clip windows.
//!
//! A render composes three layers over a fixed canvas:
//!
//! - background: solid colour (turbo) or the cover image blurred and darkened
//! - foreground: the cover image, sharp, centered
//! - waveform: an audio-reactive band near the bottom edge

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::payload::BackgroundColor;

/// Speed/quality trade-off for a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderTier {
    /// Solid-colour background, low frame rate, fastest encode.
    Turbo,

    /// Downscaled soft blur of the cover behind the foreground.
    #[default]
    Balanced,

    /// Gaussian blur, darker backdrop, slow zoom on shorts.
    Quality,
}

impl RenderTier {
    pub const ALL: &'static [RenderTier] = &[
        RenderTier::Turbo,
        RenderTier::Balanced,
        RenderTier::Quality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderTier::Turbo => "turbo",
            RenderTier::Balanced => "balanced",
            RenderTier::Quality => "quality",
        }
    }

    /// Output frame rate.
    pub fn fps(&self) -> u32 {
        match self {
            RenderTier::Turbo => 15,
            RenderTier::Balanced => 24,
            RenderTier::Quality => 30,
        }
    }

    /// x264 preset.
    pub fn preset(&self) -> &'static str {
        match self {
            RenderTier::Turbo => "ultrafast",
            RenderTier::Balanced => "veryfast",
            RenderTier::Quality => "medium",
        }
    }

    pub fn crf(&self) -> u8 {
        match self {
            RenderTier::Turbo => 30,
            RenderTier::Balanced => 26,
            RenderTier::Quality => 20,
        }
    }

    /// Returns true if the background is derived from the cover image.
    pub fn uses_image_background(&self) -> bool {
        !matches!(self, RenderTier::Turbo)
    }

    /// Returns true if the background layer carries a blur.
    pub fn uses_blur(&self) -> bool {
        self.uses_image_background()
    }

    /// Brightness offset applied to the background (`eq=brightness`).
    pub fn background_brightness(&self) -> f64 {
        match self {
            RenderTier::Turbo => 0.0,
            RenderTier::Balanced => -0.25,
            RenderTier::Quality => -0.45,
        }
    }

    /// Cover-scale factor for the background before cropping.
    pub fn background_zoom(&self) -> f64 {
        match self {
            RenderTier::Quality => 1.2,
            _ => 1.0,
        }
    }

    /// Returns true if shorts get a slow zoom across the clip.
    pub fn animates_shorts(&self) -> bool {
        matches!(self, RenderTier::Quality)
    }
}

impl fmt::Display for RenderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RenderTier {
    type Err = RenderTierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "turbo" | "fast" => Ok(RenderTier::Turbo),
            "balanced" | "normal" => Ok(RenderTier::Balanced),
            "quality" | "hq" => Ok(RenderTier::Quality),
            _ => Err(RenderTierParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown render tier: {0}")]
pub struct RenderTierParseError(String);

/// Output frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn short_edge(&self) -> u32 {
        self.width.min(self.height)
    }

    /// Side of the square box the foreground is fitted into.
    ///
    /// Rounded to an even number of pixels (yuv420p needs even sizes).
    pub fn foreground_box(&self, scale: f64) -> u32 {
        let side = (self.short_edge() as f64 * scale).round() as u32;
        (side / 2 * 2).max(2)
    }
}

impl fmt::Display for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoFormat {
    /// 1080x1080
    #[default]
    Square,
    /// 1920x1080
    Landscape,
    /// 1080x1920, used for shorts
    Vertical,
}

impl VideoFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoFormat::Square => "square",
            VideoFormat::Landscape => "landscape",
            VideoFormat::Vertical => "vertical",
        }
    }

    pub fn canvas(&self) -> Canvas {
        match self {
            VideoFormat::Square => Canvas::new(1080, 1080),
            VideoFormat::Landscape => Canvas::new(1920, 1080),
            VideoFormat::Vertical => Canvas::new(1080, 1920),
        }
    }

    /// Foreground box as a fraction of the canvas short edge.
    pub fn foreground_scale(&self) -> f64 {
        match self {
            VideoFormat::Square => 0.60,
            // 850 px on a 1080 px short edge
            VideoFormat::Landscape => 850.0 / 1080.0,
            VideoFormat::Vertical => 0.85,
        }
    }

    /// Height of the waveform band.
    pub fn waveform_height(&self) -> u32 {
        match self {
            VideoFormat::Vertical => crate::encoding::WAVEFORM_HEIGHT_TALL,
            _ => crate::encoding::WAVEFORM_HEIGHT,
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Requested excerpt of the source audio, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipWindow {
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClipWindowError {
    #[error("Clip start {start}s is outside the audio (0..{total}s)")]
    StartOutOfRange { start: f64, total: f64 },

    #[error("Clip duration must be positive, got {0}s")]
    NonPositiveDuration(f64),

    #[error("Audio duration is unknown or zero")]
    UnknownTotal,
}

impl ClipWindow {
    pub fn new(start: f64, duration: f64) -> Self {
        Self { start, duration }
    }

    /// Effective window against audio of `total` seconds.
    ///
    /// The duration is truncated so the window never runs past the end.
    pub fn clamp_to(&self, total: f64) -> Result<ClipWindow, ClipWindowError> {
        if !total.is_finite() || total <= 0.0 {
            return Err(ClipWindowError::UnknownTotal);
        }
        if !self.start.is_finite() || self.start < 0.0 || self.start >= total {
            return Err(ClipWindowError::StartOutOfRange {
                start: self.start,
                total,
            });
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ClipWindowError::NonPositiveDuration(self.duration));
        }
        Ok(ClipWindow {
            start: self.start,
            duration: self.duration.min(total - self.start),
        })
    }
}

/// What a render produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RenderKind {
    FullEpisode,
    Short,
}

/// Everything the render engine needs for one output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderRequest {
    pub kind: RenderKind,
    pub audio_path: PathBuf,
    pub image_path: PathBuf,
    pub output_path: PathBuf,
    pub canvas: Canvas,
    pub foreground_scale: f64,
    /// Waveform band height in pixels
    pub waveform_height: u32,
    pub tier: RenderTier,
    pub background_color: BackgroundColor,
    /// Excerpt to render; `None` renders the whole audio
    pub clip: Option<ClipWindow>,
}

impl RenderRequest {
    /// Full-episode render in the given layout.
    pub fn full_episode(
        audio_path: impl Into<PathBuf>,
        image_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        format: VideoFormat,
        tier: RenderTier,
    ) -> Self {
        Self {
            kind: RenderKind::FullEpisode,
            audio_path: audio_path.into(),
            image_path: image_path.into(),
            output_path: output_path.into(),
            canvas: format.canvas(),
            foreground_scale: format.foreground_scale(),
            waveform_height: format.waveform_height(),
            tier,
            background_color: BackgroundColor::default(),
            clip: None,
        }
    }

    /// Vertical short over `clip`.
    pub fn short(
        audio_path: impl Into<PathBuf>,
        image_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        clip: ClipWindow,
        tier: RenderTier,
    ) -> Self {
        let format = VideoFormat::Vertical;
        Self {
            kind: RenderKind::Short,
            audio_path: audio_path.into(),
            image_path: image_path.into(),
            output_path: output_path.into(),
            canvas: format.canvas(),
            foreground_scale: format.foreground_scale(),
            waveform_height: format.waveform_height(),
            tier,
            background_color: BackgroundColor::default(),
            clip: Some(clip),
        }
    }

    pub fn with_background_color(mut self, color: BackgroundColor) -> Self {
        self.background_color = color;
        self
    }

    pub fn is_short(&self) -> bool {
        matches!(self.kind, RenderKind::Short)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parse() {
        assert_eq!("turbo".parse::<RenderTier>().unwrap(), RenderTier::Turbo);
        assert_eq!("Balanced".parse::<RenderTier>().unwrap(), RenderTier::Balanced);
        assert_eq!("quality".parse::<RenderTier>().unwrap(), RenderTier::Quality);
        assert!("ultra".parse::<RenderTier>().is_err());
    }

    #[test]
    fn test_tier_strategies() {
        assert!(!RenderTier::Turbo.uses_blur());
        assert!(!RenderTier::Turbo.uses_image_background());
        assert!(RenderTier::Balanced.uses_blur());
        assert!(RenderTier::Quality.animates_shorts());
        assert!(
            RenderTier::Quality.background_brightness()
                < RenderTier::Balanced.background_brightness()
        );
        for pair in RenderTier::ALL.windows(2) {
            assert!(pair[0].fps() <= pair[1].fps());
            assert!(pair[0].crf() >= pair[1].crf());
        }
    }

    #[test]
    fn test_format_layout() {
        assert_eq!(VideoFormat::Square.canvas(), Canvas::new(1080, 1080));
        assert_eq!(VideoFormat::Landscape.canvas().to_string(), "1920x1080");
        assert_eq!(VideoFormat::Square.canvas().foreground_box(0.60), 648);
        assert_eq!(
            VideoFormat::Landscape
                .canvas()
                .foreground_box(VideoFormat::Landscape.foreground_scale()),
            850
        );
        assert_eq!(VideoFormat::Vertical.canvas().foreground_box(0.85), 918);
    }

    #[test]
    fn test_clip_window_truncated_at_end() {
        let total = 183.4;
        let window = ClipWindow::new(total - 5.0, 58.0).clamp_to(total).unwrap();
        assert!((window.duration - 5.0).abs() < 1e-9);
        assert_eq!(window.start, total - 5.0);
    }

    #[test]
    fn test_clip_window_inside_audio_unchanged() {
        let window = ClipWindow::new(10.0, 30.0).clamp_to(120.0).unwrap();
        assert_eq!(window, ClipWindow::new(10.0, 30.0));
    }

    #[test]
    fn test_clip_window_rejects_bad_input() {
        assert!(matches!(
            ClipWindow::new(120.0, 10.0).clamp_to(120.0),
            Err(ClipWindowError::StartOutOfRange { .. })
        ));
        assert!(matches!(
            ClipWindow::new(-1.0, 10.0).clamp_to(120.0),
            Err(ClipWindowError::StartOutOfRange { .. })
        ));
        assert!(matches!(
            ClipWindow::new(5.0, 0.0).clamp_to(120.0),
            Err(ClipWindowError::NonPositiveDuration(_))
        ));
        assert_eq!(
            ClipWindow::new(0.0, 10.0).clamp_to(0.0),
            Err(ClipWindowError::UnknownTotal)
        );
    }

    #[test]
    fn test_short_request_is_vertical() {
        let req = RenderRequest::short(
            "a.mp3",
            "c.png",
            "out.mp4",
            ClipWindow::new(0.0, 30.0),
            RenderTier::Turbo,
        );
        assert!(req.is_short());
        assert_eq!(req.canvas, Canvas::new(1080, 1920));
        assert_eq!(req.waveform_height, 260);
    }
}
