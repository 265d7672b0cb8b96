//! Start-up recovery for jobs left `processing` by a dead worker.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

use pcast_models::{JobId, JobStatus};

use crate::error::StoreResult;
use crate::store::{insert_pending, job_mut, JobStore};

/// What to do with a job found `processing` when the worker starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    /// Mark it failed so an operator can resubmit.
    #[default]
    Fail,
    /// Mark it failed and submit a fresh copy of its payload.
    Requeue,
}

impl RecoveryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryPolicy::Fail => "fail",
            RecoveryPolicy::Requeue => "requeue",
        }
    }
}

impl fmt::Display for RecoveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RecoveryPolicy {
    type Err = RecoveryPolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(RecoveryPolicy::Fail),
            "requeue" | "retry" => Ok(RecoveryPolicy::Requeue),
            _ => Err(RecoveryPolicyParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown recovery policy: {0}")]
pub struct RecoveryPolicyParseError(String);

impl JobStore {
    /// Resolve every `processing` job according to `policy`.
    ///
    /// Returns the ids of the interrupted jobs, in submission order. The store
    /// is written once, and only if something was found.
    pub fn recover_interrupted(&self, policy: RecoveryPolicy) -> StoreResult<Vec<JobId>> {
        let _guard = self.lock();
        let mut snapshot = self.read_for_write()?;
        let jobs = &mut snapshot.jobs;

        let mut interrupted: Vec<(u64, JobId)> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Processing)
            .map(|j| (j.seq, j.id.clone()))
            .collect();
        if interrupted.is_empty() {
            self.finish_read(&snapshot)?;
            return Ok(Vec::new());
        }
        interrupted.sort();

        let mut recovered = Vec::with_capacity(interrupted.len());
        for (_, id) in interrupted {
            let job = job_mut(jobs, &id)?;
            let progress = job.progress;
            let payload = job.payload.clone();

            let mut message = format!(
                "interrupted: worker restarted while job was processing (progress {}%)",
                progress
            );
            if policy == RecoveryPolicy::Requeue {
                let replacement = insert_pending(jobs, payload);
                message.push_str(&format!("; requeued as {}", replacement.id));
                info!(job_id = %id, requeued_as = %replacement.id, "Requeued interrupted job");
            } else {
                warn!(job_id = %id, progress, "Marking interrupted job as failed");
            }

            job_mut(jobs, &id)?.fail(message)?;
            recovered.push(id);
        }

        self.write_snapshot(&snapshot)?;
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcast_models::{JobPayload, UploadDestination, UploadPayload};
    use tempfile::TempDir;

    fn upload() -> JobPayload {
        JobPayload::Upload(UploadPayload {
            file_path: "inbox/ep.mp3".into(),
            title: "Episode".into(),
            description: String::new(),
            destination: UploadDestination::VideoPlatform,
            visibility: Default::default(),
        })
    }

    fn store_with_interrupted_job(dir: &TempDir) -> (JobStore, JobId) {
        let store = JobStore::new(dir.path().join("jobs.json"));
        let job = store.submit(upload()).unwrap();
        store.claim_next().unwrap();
        store.update_progress(&job.id, 37).unwrap();
        (store, job.id)
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("fail".parse::<RecoveryPolicy>().unwrap(), RecoveryPolicy::Fail);
        assert_eq!("Requeue".parse::<RecoveryPolicy>().unwrap(), RecoveryPolicy::Requeue);
        assert!("ignore".parse::<RecoveryPolicy>().is_err());
        assert_eq!(RecoveryPolicy::default(), RecoveryPolicy::Fail);
    }

    #[test]
    fn test_fail_policy_marks_interrupted_failed() {
        let dir = TempDir::new().unwrap();
        let (store, id) = store_with_interrupted_job(&dir);

        let recovered = store.recover_interrupted(RecoveryPolicy::Fail).unwrap();
        assert_eq!(recovered, vec![id.clone()]);

        let job = store.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("progress 37%"));
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_requeue_policy_submits_copy() {
        let dir = TempDir::new().unwrap();
        let (store, id) = store_with_interrupted_job(&dir);

        store.recover_interrupted(RecoveryPolicy::Requeue).unwrap();

        let jobs = store.list();
        assert_eq!(jobs.len(), 2);
        let old = &jobs[0];
        let new = &jobs[1];
        assert_eq!(old.id, id);
        assert_eq!(old.status, JobStatus::Failed);
        assert!(old.error.as_ref().unwrap().contains(new.id.as_str()));
        assert_eq!(new.status, JobStatus::Pending);
        assert_eq!(new.payload, old.payload);
        assert!(new.seq > old.seq);
    }

    #[test]
    fn test_nothing_to_recover_does_not_write() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path().join("jobs.json"));
        assert!(store.recover_interrupted(RecoveryPolicy::Fail).unwrap().is_empty());
        assert!(!store.path().exists());
    }
}
