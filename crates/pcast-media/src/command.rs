//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::progress::{parse_clock, FfmpegProgress};

/// Number of diagnostic stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// `-v` level for every invocation.
const LOG_LEVEL: &str = "error";

/// One `-i` input with the options that precede it.
#[derive(Debug, Clone)]
pub struct FfmpegInput {
    args: Vec<String>,
    path: PathBuf,
}

impl FfmpegInput {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            args: Vec::new(),
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Add an input option (placed before this input's `-i`).
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Loop a still image at `fps`.
    pub fn looped_image(self, fps: u32) -> Self {
        self.arg("-loop")
            .arg("1")
            .arg("-framerate")
            .arg(fps.to_string())
    }

    /// Set seek position.
    pub fn seek(self, seconds: f64) -> Self {
        self.arg("-ss").arg(format!("{:.3}", seconds))
    }

    /// Limit how much of the input is read.
    pub fn duration(self, seconds: f64) -> Self {
        self.arg("-t").arg(format!("{:.3}", seconds))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Inputs in `-i` order; filter labels refer to them by index
    inputs: Vec<FfmpegInput>,
    /// Output file path
    output: PathBuf,
    /// Global arguments (before the first input)
    global_args: Vec<String>,
    /// Output arguments (after the last input)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            global_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Append an input.
    pub fn input(mut self, input: FfmpegInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Add a global argument.
    pub fn global_arg(mut self, arg: impl Into<String>) -> Self {
        self.global_args.push(arg.into());
        self
    }

    /// Add output arguments (after the inputs).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream or filter label into the output.
    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    /// Cap the output duration.
    pub fn output_duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Interval between progress reports.
    pub fn stats_period(self, seconds: f64) -> Self {
        self.global_arg("-stats_period").global_arg(format!("{}", seconds))
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        // Diagnostics only; progress comes from -progress
        args.push("-v".to_string());
        args.push(LOG_LEVEL.to_string());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.global_args.iter().cloned());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking.
#[derive(Debug, Default)]
pub struct FfmpegRunner {
    binary: Option<PathBuf>,
}

impl FfmpegRunner {
    /// Create a new runner resolving `ffmpeg` from PATH.
    pub fn new() -> Self {
        Self { binary: None }
    }

    /// Use a specific ffmpeg executable.
    pub fn with_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = Some(path.into());
        self
    }

    /// Run an FFmpeg command, calling `progress_callback` for every sample.
    ///
    /// On a non-zero exit the error carries the last diagnostic lines ffmpeg
    /// wrote to stderr.
    pub async fn run_with_progress<F>(
        &self,
        cmd: &FfmpegCommand,
        mut progress_callback: F,
    ) -> MediaResult<()>
    where
        F: FnMut(&FfmpegProgress) + Send + 'static,
    {
        let binary = match &self.binary {
            Some(path) => path.clone(),
            None => check_ffmpeg()?,
        };

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stderr not captured"))?;
        let mut reader = BufReader::new(stderr).lines();

        let reader_handle = tokio::spawn(async move {
            let mut current = FfmpegProgress::default();
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

            while let Ok(Some(line)) = reader.next_line().await {
                match parse_progress_line(&line, &mut current) {
                    LineKind::Sample => progress_callback(&current),
                    LineKind::Field => {}
                    LineKind::Diagnostic => {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
            }

            Vec::from(tail).join("\n")
        });

        let status = child.wait().await?;
        let stderr_tail = reader_handle.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                (!stderr_tail.is_empty()).then_some(stderr_tail),
                status.code(),
            ))
        }
    }
}

/// Classification of one stderr line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    /// Completes a progress sample
    Sample,
    /// A `key=value` line of the progress block
    Field,
    /// Anything else: warnings, errors
    Diagnostic,
}

/// Parse a line from FFmpeg's stderr.
///
/// Handles the `-progress` key/value block (`out_time=`, `out_time_us=`,
/// `out_time_ms=`, `progress=`) and the classic stats line containing
/// `time=HH:MM:SS.ss`.
fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> LineKind {
    let line = line.trim();

    // Classic stats line: "frame=  120 fps= 60 ... time=00:00:05.00 bitrate=..."
    let time_marker = line
        .find(" time=")
        .map(|i| i + 1)
        .or_else(|| line.starts_with("time=").then_some(0));
    if let Some(idx) = time_marker {
        let value = line[idx + "time=".len()..]
            .split_whitespace()
            .next()
            .unwrap_or("");
        if let Some(ms) = parse_clock(value) {
            current.out_time_ms = ms;
            return LineKind::Sample;
        }
    }

    let Some((key, value)) = line.split_once('=') else {
        return LineKind::Diagnostic;
    };
    let value = value.trim();

    match key {
        // Both are microseconds; out_time_ms is misnamed by ffmpeg
        "out_time_us" | "out_time_ms" => {
            if let Ok(us) = value.parse::<i64>() {
                if us >= 0 {
                    current.out_time_ms = us / 1000;
                }
            }
        }
        "out_time" => {
            if let Some(ms) = parse_clock(value) {
                current.out_time_ms = ms;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return LineKind::Sample;
        }
        "fps" | "bitrate" | "total_size" | "dup_frames" | "drop_frames" | "stream_0_0_q" => {}
        _ if key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {}
        _ => return LineKind::Diagnostic,
    }

    LineKind::Field
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
