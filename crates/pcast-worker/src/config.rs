//! Worker configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use pcast_store::{RecoveryPolicy, DEFAULT_STORE_FILE};

/// An operator-supplied program plus its leading arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ExternalCommand {
    /// Split a command line on whitespace. Returns `None` for a blank string.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Job store file
    pub store_path: PathBuf,
    /// Where render outputs are written
    pub output_dir: PathBuf,
    /// Archive for upload inputs after success
    pub processed_dir: PathBuf,
    /// Archive for upload inputs after failure
    pub failed_dir: PathBuf,
    /// Credentials JSON for the hosting site
    pub secrets_path: PathBuf,
    /// Sleep between polls when no job is pending
    pub poll_interval: Duration,
    /// What to do with jobs left processing by a previous run
    pub recovery_policy: RecoveryPolicy,
    /// Hosting uploader program
    pub hosting_upload_cmd: Option<ExternalCommand>,
    /// Video platform uploader program
    pub video_upload_cmd: Option<ExternalCommand>,
    /// ffmpeg executable; resolved from PATH when unset
    pub ffmpeg_path: Option<PathBuf>,
    /// ffprobe executable; resolved from PATH when unset
    pub ffprobe_path: Option<PathBuf>,
    /// Prometheus exporter port
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_FILE),
            output_dir: PathBuf::from("generated"),
            processed_dir: PathBuf::from("processed"),
            failed_dir: PathBuf::from("failed"),
            secrets_path: default_secrets_path(),
            poll_interval: Duration::from_secs(5),
            recovery_policy: RecoveryPolicy::Fail,
            hosting_upload_cmd: None,
            video_upload_cmd: None,
            ffmpeg_path: None,
            ffprobe_path: None,
            metrics_port: None,
        }
    }
}

/// `/data/secrets.json` when a `/data` volume is mounted.
fn default_secrets_path() -> PathBuf {
    if Path::new("/data").is_dir() {
        PathBuf::from("/data/secrets.json")
    } else {
        PathBuf::from("secrets.json")
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    env_optional_path(key).unwrap_or(default)
}

fn env_optional_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let recovery_policy = match std::env::var("PCAST_RECOVERY_POLICY") {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                warn!("{}, using {}", e, defaults.recovery_policy);
                defaults.recovery_policy
            }),
            Err(_) => defaults.recovery_policy,
        };

        Self {
            store_path: env_path("PCAST_STORE_PATH", defaults.store_path),
            output_dir: env_path("PCAST_OUTPUT_DIR", defaults.output_dir),
            processed_dir: env_path("PCAST_PROCESSED_DIR", defaults.processed_dir),
            failed_dir: env_path("PCAST_FAILED_DIR", defaults.failed_dir),
            secrets_path: env_path("PCAST_SECRETS_PATH", defaults.secrets_path),
            poll_interval: Duration::from_secs(
                std::env::var("PCAST_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            recovery_policy,
            hosting_upload_cmd: std::env::var("PCAST_HOSTING_UPLOAD_CMD")
                .ok()
                .and_then(|s| ExternalCommand::parse(&s)),
            video_upload_cmd: std::env::var("PCAST_VIDEO_UPLOAD_CMD")
                .ok()
                .and_then(|s| ExternalCommand::parse(&s)),
            ffmpeg_path: env_optional_path("PCAST_FFMPEG_PATH"),
            ffprobe_path: env_optional_path("PCAST_FFPROBE_PATH"),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Config with every directory under `root`, for tests and local runs.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            store_path: root.join("data").join("jobs.json"),
            output_dir: root.join("generated"),
            processed_dir: root.join("processed"),
            failed_dir: root.join("failed"),
            secrets_path: root.join("secrets.json"),
            poll_interval: Duration::from_millis(50),
            ..Self::default()
        }
    }

    pub fn with_recovery_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.recovery_policy = policy;
        self
    }
}
