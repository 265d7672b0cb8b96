//! Upload collaborators.
//!
//! The browser-driven hosting upload and the video platform's OAuth client
//! run as external programs. The worker passes the file and metadata on the
//! command line and hosting credentials through the environment.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use pcast_models::Visibility;

use crate::config::ExternalCommand;
use crate::credentials::Credentials;
use crate::error::{WorkerError, WorkerResult};

/// Environment variables carrying hosting credentials to the uploader.
pub const LOGIN_ENV: &str = "PCAST_HOSTING_LOGIN";
pub const PASSWORD_ENV: &str = "PCAST_HOSTING_PASSWORD";

/// Lines of uploader stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 10;

/// Publishes an audio file to the podcast hosting site.
#[async_trait]
pub trait HostingUploader: Send + Sync {
    /// Returns whether the site accepted the upload. A failure the uploader
    /// can describe is an error carrying that description.
    async fn upload(
        &self,
        credentials: &Credentials,
        file: &Path,
        title: &str,
        description: &str,
    ) -> WorkerResult<bool>;
}

/// Publishes a video to the video platform.
#[async_trait]
pub trait VideoPlatformUploader: Send + Sync {
    /// Returns the public URL of the published video.
    async fn upload(
        &self,
        file: &Path,
        title: &str,
        description: &str,
        visibility: Visibility,
    ) -> WorkerResult<String>;
}

/// Output of a finished uploader process.
struct CommandOutput {
    success: bool,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    fn stderr_tail(&self) -> String {
        let lines: Vec<&str> = self.stderr.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join("\n")
    }

    /// Last non-empty stdout line.
    fn last_line(&self) -> Option<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
    }
}

async fn run_command(
    command: &ExternalCommand,
    args: &[&str],
    envs: &[(&str, &str)],
) -> WorkerResult<CommandOutput> {
    debug!(program = %command.program, "Running uploader");

    let output = Command::new(&command.program)
        .args(&command.args)
        .args(args)
        .envs(envs.iter().copied())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            WorkerError::upload_failed(format!("could not start {}: {}", command.program, e))
        })?;

    Ok(CommandOutput {
        success: output.status.success(),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// [`HostingUploader`] that runs the configured hosting upload program.
///
/// Invoked as `<cmd> --file <path> --title <title> --description <text>`;
/// exit status 0 means the site accepted the file.
#[derive(Debug, Clone, Default)]
pub struct CommandHostingUploader {
    command: Option<ExternalCommand>,
}

impl CommandHostingUploader {
    pub fn new(command: Option<ExternalCommand>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl HostingUploader for CommandHostingUploader {
    async fn upload(
        &self,
        credentials: &Credentials,
        file: &Path,
        title: &str,
        description: &str,
    ) -> WorkerResult<bool> {
        let command = self.command.as_ref().ok_or_else(|| {
            WorkerError::config_error("no hosting uploader configured (PCAST_HOSTING_UPLOAD_CMD)")
        })?;

        let file = file.to_string_lossy();
        let output = run_command(
            command,
            &["--file", &file, "--title", title, "--description", description],
            &[
                (LOGIN_ENV, credentials.login.as_str()),
                (PASSWORD_ENV, credentials.password.as_str()),
            ],
        )
        .await?;

        if !output.success {
            let stderr = output.stderr_tail();
            warn!(
                exit_code = ?output.exit_code,
                stderr = %stderr,
                "Hosting uploader reported failure"
            );
            if !stderr.is_empty() {
                return Err(WorkerError::upload_failed(format!(
                    "hosting uploader exited with {:?}: {}",
                    output.exit_code, stderr
                )));
            }
        }
        Ok(output.success)
    }
}

/// [`VideoPlatformUploader`] that runs the configured video upload program.
///
/// Invoked as `<cmd> --file <path> --title <title> --description <text>
/// --visibility <private|unlisted|public>`; prints the public URL as its last
/// line of output.
#[derive(Debug, Clone, Default)]
pub struct CommandVideoPlatformUploader {
    command: Option<ExternalCommand>,
}

impl CommandVideoPlatformUploader {
    pub fn new(command: Option<ExternalCommand>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl VideoPlatformUploader for CommandVideoPlatformUploader {
    async fn upload(
        &self,
        file: &Path,
        title: &str,
        description: &str,
        visibility: Visibility,
    ) -> WorkerResult<String> {
        let command = self.command.as_ref().ok_or_else(|| {
            WorkerError::config_error("no video uploader configured (PCAST_VIDEO_UPLOAD_CMD)")
        })?;

        let file = file.to_string_lossy();
        let output = run_command(
            command,
            &[
                "--file",
                &file,
                "--title",
                title,
                "--description",
                description,
                "--visibility",
                visibility.as_str(),
            ],
            &[],
        )
        .await?;

        if !output.success {
            return Err(WorkerError::upload_failed(format!(
                "video uploader exited with {:?}: {}",
                output.exit_code,
                output.stderr_tail()
            )));
        }
        output
            .last_line()
            .map(str::to_string)
            .ok_or_else(|| WorkerError::upload_failed("video uploader printed no URL"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            login: "studio".into(),
            password: "secret".into(),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_uploaders_fail() {
        let err = CommandHostingUploader::default()
            .upload(&creds(), Path::new("ep.mp3"), "t", "d")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::ConfigError(_)));

        let err = CommandVideoPlatformUploader::default()
            .upload(Path::new("ep.mp4"), "t", "d", Visibility::Private)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("PCAST_VIDEO_UPLOAD_CMD"));
    }

    #[tokio::test]
    async fn test_missing_program_is_upload_error() {
        let uploader = CommandVideoPlatformUploader::new(ExternalCommand::parse(
            "/nonexistent/pcast-uploader-binary",
        ));
        let err = uploader
            .upload(Path::new("ep.mp4"), "t", "d", Visibility::Public)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::UploadFailed(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_video_uploader_reads_last_line() {
        let uploader = CommandVideoPlatformUploader::new(Some(ExternalCommand {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                "echo uploading; echo https://video.example/watch?v=abc123; echo".into(),
                "uploader".into(),
            ],
        }));
        let url = uploader
            .upload(Path::new("ep.mp4"), "Episode", "", Visibility::Unlisted)
            .await
            .unwrap();
        assert_eq!(url, "https://video.example/watch?v=abc123");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hosting_uploader_exit_status() {
        let ok = CommandHostingUploader::new(Some(ExternalCommand {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                format!("test \"${LOGIN_ENV}\" = studio"),
                "uploader".into(),
            ],
        }));
        assert!(ok.upload(&creds(), Path::new("ep.mp3"), "t", "d").await.unwrap());

        let rejected = CommandHostingUploader::new(ExternalCommand::parse("false"));
        assert!(!rejected.upload(&creds(), Path::new("ep.mp3"), "t", "d").await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hosting_uploader_stderr_reaches_error() {
        let uploader = CommandHostingUploader::new(Some(ExternalCommand {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                "echo opening browser; echo login rejected >&2; exit 1".into(),
                "uploader".into(),
            ],
        }));
        let err = uploader
            .upload(&creds(), Path::new("ep.mp3"), "t", "d")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::UploadFailed(_)));
        let message = err.job_message();
        assert!(message.contains("login rejected"), "{}", message);
        assert!(!message.contains("opening browser"), "{}", message);
    }
}
