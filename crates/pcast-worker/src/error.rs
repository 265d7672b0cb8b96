//! Worker error types.

use std::path::PathBuf;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Input file not found: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Handler aborted: {0}")]
    HandlerAborted(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Store error: {0}")]
    Store(#[from] pcast_store::StoreError),

    #[error("Media error: {0}")]
    Media(#[from] pcast_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn missing_credentials(msg: impl Into<String>) -> Self {
        Self::MissingCredentials(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Text recorded on a failed job.
    ///
    /// Media errors carry the encoder's diagnostics.
    pub fn job_message(&self) -> String {
        match self {
            WorkerError::Media(e) => e.detailed_message(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcast_media::MediaError;

    #[test]
    fn test_job_message_includes_ffmpeg_stderr() {
        let err = WorkerError::from(MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            Some("cover.png: Invalid data found when processing input".into()),
            Some(1),
        ));
        let msg = err.job_message();
        assert!(msg.contains("non-zero status"));
        assert!(msg.contains("Invalid data found"));
    }

    #[test]
    fn test_input_missing_message() {
        let err = WorkerError::InputMissing(PathBuf::from("inbox/ep.mp3"));
        assert_eq!(err.job_message(), "Input file not found: inbox/ep.mp3");
    }
}
