//! Job definitions and the job status state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::payload::JobPayload;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job processing status.
///
/// Legal edges are `pending -> processing -> {completed | failed}`.
/// Terminal states have no outgoing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, waiting for the worker
    #[default]
    Pending,
    /// Claimed by the worker
    Processing,
    /// Handler finished successfully
    Completed,
    /// Handler raised an error, or the job was interrupted
    Failed,
}

impl JobStatus {
    pub const ALL: &'static [JobStatus] = &[
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(JobStatusParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown job status: {0}")]
pub struct JobStatusParseError(String);

/// Type of job, determines which handler processes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Publish a file to the hosting site or the video platform
    Upload,
    /// Render a full-episode video
    GenerateVideo,
    /// Render a vertical short from a clip window
    GenerateShort,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Upload => "upload",
            JobType::GenerateVideo => "generate_video",
            JobType::GenerateShort => "generate_short",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Illegal transition for job {id}: {from} -> {to}")]
pub struct TransitionError {
    pub id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Handler-produced result attached on completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Produced artifact (render output)
    pub result_path: Option<PathBuf>,
    /// Public URL returned by the video platform
    pub result_url: Option<String>,
}

impl JobOutcome {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            result_path: Some(path.into()),
            result_url: None,
        }
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            result_path: None,
            result_url: Some(url.into()),
        }
    }
}

/// A unit of work tracked through the status lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Submission sequence number, used to order pending jobs
    #[serde(default)]
    pub seq: u64,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Type-specific parameters; the `type` tag lives here
    #[serde(flatten)]
    pub payload: JobPayload,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Claimed at timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Terminal status timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Failure cause (only when failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Artifact produced by the handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<PathBuf>,

    /// Public URL produced by the handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(seq: u64, payload: JobPayload) -> Self {
        Self {
            id: JobId::new(),
            seq,
            status: JobStatus::Pending,
            progress: 0,
            payload,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            result_path: None,
            result_url: None,
        }
    }

    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next`, applying the side effects every edge requires.
    pub fn transition_to(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        self.status = next;
        match next {
            JobStatus::Processing => {
                self.progress = 0;
                self.started_at = Some(now);
                self.error = None;
            }
            JobStatus::Completed => {
                self.progress = 100;
                self.finished_at = Some(now);
                self.error = None;
            }
            JobStatus::Failed => {
                self.finished_at = Some(now);
            }
            JobStatus::Pending => {}
        }
        Ok(())
    }

    /// Claim the job for processing.
    pub fn begin(&mut self) -> Result<(), TransitionError> {
        self.transition_to(JobStatus::Processing)
    }

    /// Record a progress sample.
    ///
    /// Only applies while processing; values are clamped to 100 and a sample
    /// lower than the current progress is ignored. Returns whether the stored
    /// value changed.
    pub fn record_progress(&mut self, progress: u8) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        let progress = progress.min(100);
        if progress <= self.progress {
            return false;
        }
        self.progress = progress;
        true
    }

    /// Mark job as completed and attach the handler result.
    pub fn complete(&mut self, outcome: JobOutcome) -> Result<(), TransitionError> {
        self.transition_to(JobStatus::Completed)?;
        self.result_path = outcome.result_path;
        self.result_url = outcome.result_url;
        Ok(())
    }

    /// Mark job as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition_to(JobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{UploadDestination, UploadPayload};

    fn upload_job() -> Job {
        Job::new(
            1,
            JobPayload::Upload(UploadPayload {
                file_path: "inbox/episode.mp3".into(),
                title: "Episode 1".into(),
                description: String::new(),
                destination: UploadDestination::Hosting,
                visibility: Default::default(),
            }),
        )
    }

    /// Every status sequence starting at `pending`, up to `len` steps.
    fn sequences(len: usize) -> Vec<Vec<JobStatus>> {
        let mut out = vec![vec![]];
        let mut frontier = vec![vec![]];
        for _ in 0..len {
            let mut next = Vec::new();
            for seq in &frontier {
                for status in JobStatus::ALL {
                    let mut s: Vec<JobStatus> = seq.clone();
                    s.push(*status);
                    next.push(s);
                }
            }
            out.extend(next.iter().cloned());
            frontier = next;
        }
        out
    }

    fn is_lifecycle_prefix(seq: &[JobStatus]) -> bool {
        let full: [&[JobStatus]; 2] = [
            &[JobStatus::Processing, JobStatus::Completed],
            &[JobStatus::Processing, JobStatus::Failed],
        ];
        full.iter().any(|path| path.starts_with(seq))
    }

    #[test]
    fn test_transition_sequences_follow_lifecycle() {
        for seq in sequences(5) {
            let mut job = upload_job();
            let accepted = seq.iter().all(|s| job.transition_to(*s).is_ok());
            assert_eq!(
                accepted,
                is_lifecycle_prefix(&seq),
                "sequence {:?} accepted={}",
                seq,
                accepted
            );
        }
    }

    #[test]
    fn test_rejected_transition_leaves_job_untouched() {
        let mut job = upload_job();
        job.begin().unwrap();
        job.complete(JobOutcome::default()).unwrap();
        let before = job.clone();

        let err = job.fail("late failure").unwrap_err();
        assert_eq!(err.from, JobStatus::Completed);
        assert_eq!(err.to, JobStatus::Failed);
        assert_eq!(job, before);
    }

    #[test]
    fn test_progress_is_monotonic_and_bounded() {
        let mut job = upload_job();
        assert!(!job.record_progress(10), "pending jobs take no progress");

        job.begin().unwrap();
        let samples = [3u8, 1, 40, 40, 39, 99, 250, 7];
        let mut seen = Vec::new();
        for s in samples {
            job.record_progress(s);
            seen.push(job.progress);
        }

        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen.iter().all(|p| *p <= 100));
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_begin_resets_progress() {
        let mut job = upload_job();
        job.progress = 42;
        job.begin().unwrap();
        assert_eq!(job.progress, 0);
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn test_terminal_timestamps_and_error() {
        let mut job = upload_job();
        job.begin().unwrap();
        job.fail("boom").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert!(job.finished_at.is_some());

        let mut job = upload_job();
        job.begin().unwrap();
        job.record_progress(50);
        job.complete(JobOutcome::with_path("generated/out.mp4")).unwrap();
        assert_eq!(job.progress, 100);
        assert!(job.error.is_none());
        assert_eq!(job.result_path, Some(PathBuf::from("generated/out.mp4")));
    }

    #[test]
    fn test_job_serializes_type_tag() {
        let job = upload_job();
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["type"], "upload");
        assert_eq!(json["status"], "pending");
        assert!(json.get("error").is_none());

        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("processing".parse::<JobStatus>().unwrap(), JobStatus::Processing);
        assert_eq!("FAILED".parse::<JobStatus>().unwrap(), JobStatus::Failed);
        assert!("stale".parse::<JobStatus>().is_err());
    }
}
