//! FFprobe audio information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Audio stream information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    /// Duration in seconds (0 when ffprobe cannot tell)
    pub duration: f64,
    /// Audio codec
    pub codec: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    pub channels: u32,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    duration: Option<String>,
}

/// Probe a media file for its first audio stream.
pub async fn probe_audio(path: impl AsRef<Path>) -> MediaResult<AudioInfo> {
    probe_audio_with(None, path.as_ref()).await
}

/// [`probe_audio`] with an explicit ffprobe executable; `None` resolves it
/// from PATH.
pub async fn probe_audio_with(ffprobe: Option<&Path>, path: &Path) -> MediaResult<AudioInfo> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let ffprobe = match ffprobe {
        Some(binary) => binary.to_path_buf(),
        None => check_ffprobe()?,
    };

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed on {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

/// Get audio duration in seconds.
pub async fn get_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    Ok(probe_audio(path).await?.duration)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<AudioInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .ok_or_else(|| MediaError::InvalidAudio("No audio stream found".to_string()))?;

    // Container duration first; some formats only report it per stream
    let duration = parse_seconds(probe.format.duration.as_deref())
        .or_else(|| parse_seconds(audio.duration.as_deref()))
        .unwrap_or(0.0);

    Ok(AudioInfo {
        duration,
        codec: audio.codec_name.clone().unwrap_or_default(),
        sample_rate: audio
            .sample_rate
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or(0),
        channels: audio.channels.unwrap_or(0),
    })
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}
