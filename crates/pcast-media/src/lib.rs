//! FFmpeg CLI wrapper for podcast video rendering.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2` and stats lines
//! - FFprobe audio probing
//! - The layered cover/waveform render for each tier
//! - Cross-device file moves for archiving

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod progress;
pub mod render;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegInput, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{move_file, move_into};
pub use probe::{get_duration, probe_audio, probe_audio_with, AudioInfo};
pub use progress::{FfmpegProgress, ProgressTracker};
pub use render::{
    render, render_with, FfmpegRenderer, FilterGraph, ProgressSink, RenderWindow, Renderer,
    Toolchain,
};
