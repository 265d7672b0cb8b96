//! Cover-art video rendering.
//!
//! [`render`] turns a [`RenderRequest`] into an MP4: probe the audio, work out
//! the effective window, build the layered filter graph for the tier, run
//! ffmpeg and translate its progress into percentages.

pub mod graph;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use pcast_models::{EncodingConfig, RenderRequest};

use crate::command::{FfmpegCommand, FfmpegInput, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{ensure_parent, remove_partial};
use crate::probe::probe_audio_with;
use crate::progress::ProgressTracker;

pub use graph::{FilterGraph, AUDIO_INPUT, IMAGE_INPUT, VIDEO_OUT};

/// Seconds between ffmpeg progress reports.
const STATS_PERIOD_SECS: f64 = 0.25;

/// Receives progress percentages (0-99 while running, 100 on success).
pub type ProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

/// Span of the audio a render covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderWindow {
    /// Seek offset into the audio
    pub start: f64,
    /// Output length; `None` when the audio duration is unknown
    pub duration: Option<f64>,
}

impl RenderWindow {
    /// Resolve the window for `request` against audio of `total` seconds.
    pub fn resolve(request: &RenderRequest, total: f64) -> MediaResult<Self> {
        match request.clip {
            Some(clip) => {
                let window = clip.clamp_to(total)?;
                Ok(Self {
                    start: window.start,
                    duration: Some(window.duration),
                })
            }
            None => Ok(Self {
                start: 0.0,
                duration: (total.is_finite() && total > 0.0).then_some(total),
            }),
        }
    }
}

/// Check everything that can be checked without running ffmpeg.
pub fn validate_request(request: &RenderRequest) -> MediaResult<()> {
    for path in [&request.audio_path, &request.image_path] {
        if !path.is_file() {
            return Err(MediaError::FileNotFound(path.clone()));
        }
    }
    let canvas = request.canvas;
    if canvas.width % 2 != 0 || canvas.height % 2 != 0 || canvas.width == 0 || canvas.height == 0 {
        return Err(MediaError::InvalidRequest(format!(
            "canvas {} must have even, non-zero dimensions",
            canvas
        )));
    }
    if !(request.foreground_scale > 0.0 && request.foreground_scale <= 1.0) {
        return Err(MediaError::InvalidRequest(format!(
            "foreground scale {} outside (0, 1]",
            request.foreground_scale
        )));
    }
    if request.waveform_height >= canvas.height {
        return Err(MediaError::InvalidRequest(format!(
            "waveform band {}px does not fit canvas {}",
            request.waveform_height, canvas
        )));
    }
    Ok(())
}

/// Assemble the ffmpeg invocation for `request` over `window`.
pub fn build_command(request: &RenderRequest, window: &RenderWindow) -> FfmpegCommand {
    let tier = request.tier;
    let fps = tier.fps();
    let graph = FilterGraph::build(request, window.duration.unwrap_or(0.0));

    let mut audio = FfmpegInput::new(&request.audio_path);
    if request.is_short() {
        audio = audio.seek(window.start);
        if let Some(duration) = window.duration {
            audio = audio.duration(duration);
        }
    }

    let mut cmd = FfmpegCommand::new(&request.output_path)
        .stats_period(STATS_PERIOD_SECS)
        .input(FfmpegInput::new(&request.image_path).looped_image(fps))
        .input(audio)
        .filter_complex(graph.to_filter_complex())
        .map(VIDEO_OUT)
        .map(AUDIO_INPUT)
        .output_args(EncodingConfig::for_tier(tier).to_ffmpeg_args())
        .output_arg("-r")
        .output_arg(fps.to_string());

    if let Some(duration) = window.duration {
        cmd = cmd.output_duration(duration);
    }

    cmd.output_arg("-shortest")
        .output_arg("-movflags")
        .output_arg("+faststart")
}

/// Executables a render shells out to. `None` resolves the binary from PATH.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toolchain {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

impl Toolchain {
    pub fn new(ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Self {
        Self { ffmpeg, ffprobe }
    }

    fn runner(&self) -> FfmpegRunner {
        match &self.ffmpeg {
            Some(path) => FfmpegRunner::new().with_binary(path),
            None => FfmpegRunner::new(),
        }
    }

    fn ffprobe(&self) -> Option<&Path> {
        self.ffprobe.as_deref()
    }
}

/// Render `request` with the ffmpeg and ffprobe found on PATH.
pub async fn render<F>(request: &RenderRequest, progress: F) -> MediaResult<PathBuf>
where
    F: Fn(u8) + Send + Sync + 'static,
{
    render_with(&Toolchain::default(), request, progress).await
}

/// Render `request` using `tools`, reporting progress through `progress`.
///
/// On failure the partial output file is removed.
pub async fn render_with<F>(
    tools: &Toolchain,
    request: &RenderRequest,
    progress: F,
) -> MediaResult<PathBuf>
where
    F: Fn(u8) + Send + Sync + 'static,
{
    validate_request(request)?;

    let audio = probe_audio_with(tools.ffprobe(), &request.audio_path).await?;
    let window = RenderWindow::resolve(request, audio.duration)?;
    if window.duration.is_none() {
        warn!(
            audio = %request.audio_path.display(),
            "Audio duration unknown, rendering without progress"
        );
    }

    let cmd = build_command(request, &window);
    ensure_parent(&request.output_path).await?;

    let progress = Arc::new(progress);
    let sink = Arc::clone(&progress);
    let mut tracker = ProgressTracker::new(window.duration.unwrap_or(0.0));

    info!(
        tier = %request.tier,
        canvas = %request.canvas,
        start = window.start,
        duration = ?window.duration,
        output = %request.output_path.display(),
        "Starting render"
    );
    let started = Instant::now();

    let result = tools
        .runner()
        .run_with_progress(&cmd, move |sample| {
            if let Some(pct) = tracker.observe(sample) {
                sink(pct);
            }
        })
        .await
        .and_then(|()| {
            if request.output_path.is_file() {
                Ok(())
            } else {
                Err(MediaError::ffmpeg_failed(
                    "FFmpeg exited successfully but wrote no output",
                    None,
                    Some(0),
                ))
            }
        });

    match result {
        Ok(()) => {
            progress(100);
            debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Render finished");
            Ok(request.output_path.clone())
        }
        Err(e) => {
            remove_partial(&request.output_path).await;
            Err(e)
        }
    }
}

/// Seam between the worker and the render engine.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        request: &RenderRequest,
        progress: ProgressSink,
    ) -> MediaResult<PathBuf>;
}

/// [`Renderer`] backed by the ffmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRenderer {
    tools: Toolchain,
}

impl FfmpegRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(tools: Toolchain) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(
        &self,
        request: &RenderRequest,
        progress: ProgressSink,
    ) -> MediaResult<PathBuf> {
        render_with(&self.tools, request, move |pct| progress(pct)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcast_models::{ClipWindow, ClipWindowError, RenderTier, VideoFormat};
    use tempfile::TempDir;

    fn short_request(start: f64, duration: f64) -> RenderRequest {
        RenderRequest::short(
            "ep.mp3",
            "cover.png",
            "generated/short.mp4",
            ClipWindow::new(start, duration),
            RenderTier::Balanced,
        )
    }

    #[test]
    fn test_window_for_full_episode() {
        let req = RenderRequest::full_episode(
            "a.mp3",
            "c.png",
            "o.mp4",
            VideoFormat::Square,
            RenderTier::Turbo,
        );
        let window = RenderWindow::resolve(&req, 1834.2).unwrap();
        assert_eq!(window.start, 0.0);
        assert_eq!(window.duration, Some(1834.2));

        let window = RenderWindow::resolve(&req, 0.0).unwrap();
        assert_eq!(window.duration, None);
    }

    #[test]
    fn test_window_for_short_is_clamped() {
        let window = RenderWindow::resolve(&short_request(95.0, 58.0), 100.0).unwrap();
        assert_eq!(window.start, 95.0);
        assert_eq!(window.duration, Some(5.0));

        let err = RenderWindow::resolve(&short_request(100.0, 58.0), 100.0).unwrap_err();
        assert!(matches!(
            err,
            MediaError::InvalidClip(ClipWindowError::StartOutOfRange { .. })
        ));
    }

    #[test]
    fn test_short_command_seeks_audio_only() {
        let req = short_request(12.5, 30.0);
        let window = RenderWindow::resolve(&req, 100.0).unwrap();
        let args = build_command(&req, &window).build_args();
        let pos = |s: &str| args.iter().position(|a| a == s).unwrap();

        assert!(pos("cover.png") < pos("-ss"));
        assert!(pos("-ss") < pos("ep.mp3"));
        assert_eq!(args[pos("-ss") + 1], "12.500");
        assert_eq!(args[pos("-framerate") + 1], "24");
        assert!(args.contains(&"-shortest".to_string()));
        assert!(args.contains(&"+faststart".to_string()));
        assert_eq!(args[pos("-stats_period") + 1], "0.25");
        assert_eq!(args[pos("-preset") + 1], "veryfast");
        // output -t after the last input
        let last_t = args.iter().rposition(|a| a == "-t").unwrap();
        assert!(last_t > pos("ep.mp3"));
        assert_eq!(args[last_t + 1], "30.000");
    }

    #[test]
    fn test_full_episode_command_has_no_seek() {
        let req = RenderRequest::full_episode(
            "a.mp3",
            "c.png",
            "o.mp4",
            VideoFormat::Landscape,
            RenderTier::Quality,
        );
        let window = RenderWindow::resolve(&req, 60.0).unwrap();
        let args = build_command(&req, &window).build_args();
        assert!(!args.contains(&"-ss".to_string()));
        assert!(args.contains(&"medium".to_string()));
        assert!(args.contains(&"192k".to_string()));
    }

    #[test]
    fn test_validate_missing_inputs() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("cover.png");
        std::fs::write(&image, b"png").unwrap();

        let req = RenderRequest::full_episode(
            dir.path().join("missing.mp3"),
            &image,
            dir.path().join("out.mp4"),
            VideoFormat::Square,
            RenderTier::Turbo,
        );
        let err = validate_request(&req).unwrap_err();
        assert!(err.to_string().contains("missing.mp3"));
    }

    #[test]
    fn test_validate_rejects_odd_canvas() {
        let dir = TempDir::new().unwrap();
        let audio = dir.path().join("ep.mp3");
        let image = dir.path().join("cover.png");
        std::fs::write(&audio, b"id3").unwrap();
        std::fs::write(&image, b"png").unwrap();

        let mut req = RenderRequest::full_episode(
            &audio,
            &image,
            "o.mp4",
            VideoFormat::Square,
            RenderTier::Turbo,
        );
        req.canvas.width = 1081;
        assert!(matches!(validate_request(&req), Err(MediaError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_render_missing_audio_fails_fast() {
        let dir = TempDir::new().unwrap();
        let req = RenderRequest::full_episode(
            dir.path().join("nope.mp3"),
            dir.path().join("nope.png"),
            dir.path().join("out.mp4"),
            VideoFormat::Square,
            RenderTier::Turbo,
        );
        let err = render(&req, |_| {}).await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
        assert!(!dir.path().join("out.mp4").exists());
    }

    /// Write an executable shell script standing in for ffmpeg or ffprobe.
    #[cfg(unix)]
    fn stub_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn stub_toolchain(dir: &Path, ffmpeg_body: &str) -> Toolchain {
        let ffprobe = stub_tool(
            dir,
            "ffprobe",
            r#"echo '{"streams": [{"codec_type": "audio", "codec_name": "aac"}], "format": {"duration": "10.0"}}'"#,
        );
        let ffmpeg = stub_tool(dir, "ffmpeg", ffmpeg_body);
        Toolchain::new(Some(ffmpeg), Some(ffprobe))
    }

    #[cfg(unix)]
    fn stub_request(dir: &Path) -> RenderRequest {
        let audio = dir.join("ep.mp3");
        let image = dir.join("cover.png");
        std::fs::write(&audio, b"id3").unwrap();
        std::fs::write(&image, b"png").unwrap();
        RenderRequest::full_episode(
            &audio,
            &image,
            dir.join("out").join("episode.mp4"),
            VideoFormat::Square,
            RenderTier::Balanced,
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_ffmpeg_removes_partial_output() {
        let dir = TempDir::new().unwrap();
        // The output path is the last argument
        let tools = stub_toolchain(
            dir.path(),
            r#"for last; do :; done
echo partial > "$last"
echo out_time_us=2000000 >&2
echo progress=continue >&2
echo "Conversion failed: stub error" >&2
exit 1"#,
        );
        let req = stub_request(dir.path());

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let err = render_with(&tools, &req, move |pct| sink.lock().unwrap().push(pct))
            .await
            .unwrap_err();

        assert!(!req.output_path.exists());
        match err {
            MediaError::FfmpegFailed {
                stderr, exit_code, ..
            } => {
                assert_eq!(exit_code, Some(1));
                assert!(stderr.unwrap_or_default().contains("stub error"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(*seen.lock().unwrap(), vec![20]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_ffmpeg_finishes_at_100() {
        let dir = TempDir::new().unwrap();
        let tools = stub_toolchain(
            dir.path(),
            r#"for last; do :; done
echo out_time_us=5000000 >&2
echo progress=continue >&2
echo mp4 > "$last"
echo out_time_us=10000000 >&2
echo progress=end >&2"#,
        );
        let req = stub_request(dir.path());

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let path = render_with(&tools, &req, move |pct| sink.lock().unwrap().push(pct))
            .await
            .unwrap();

        assert_eq!(path, req.output_path);
        assert!(path.is_file());
        assert_eq!(*seen.lock().unwrap(), vec![50, 99, 100]);
    }
}
