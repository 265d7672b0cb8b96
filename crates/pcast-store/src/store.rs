//! JSON file store with atomic replacement.
//!
//! The whole job map is one pretty-printed JSON object keyed by job id.
//! Every write serializes the full map into a temp file in the store's
//! directory, syncs it, and renames it over the canonical path, so readers
//! observe either the old or the new document.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use pcast_models::{Job, JobId, JobOutcome, JobPayload, JobStatus};

use crate::error::{StoreError, StoreResult};

/// Default location of the store file.
pub const DEFAULT_STORE_FILE: &str = "data/jobs.json";

/// In-memory view of the store.
pub type JobMap = BTreeMap<JobId, Job>;

/// A serialized snapshot waiting to replace the store file.
///
/// Dropping it without calling [`StagedWrite::commit`] deletes the temp file
/// and leaves the canonical file untouched.
#[derive(Debug)]
pub struct StagedWrite {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    /// Location of the temp file.
    pub fn temp_path(&self) -> &Path {
        self.file.path()
    }

    /// Atomically rename the snapshot over the store file.
    pub fn commit(self) -> StoreResult<()> {
        let target = self.target;
        self.file.persist(&target)?;
        sync_parent(&target);
        Ok(())
    }
}

/// File-backed job record store.
///
/// Writes within one process are serialized; the file itself is the only
/// shared state, so any number of readers may `load` concurrently.
#[derive(Debug)]
pub struct JobStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_bytes(&self) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(|b| b.is_ascii_whitespace()) => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Decode the store file record by record.
    ///
    /// A missing or blank file is an empty store. Only an unreadable file or
    /// a document that is not a JSON object of records is an error.
    pub(crate) fn read_snapshot(&self) -> StoreResult<Snapshot> {
        match self.read_bytes()? {
            Some(bytes) => Snapshot::decode(&bytes),
            None => Ok(Snapshot::default()),
        }
    }

    /// Read the store, reporting unreadable or corrupt files as errors.
    ///
    /// Records that do not decode are logged and left out.
    pub fn try_load(&self) -> StoreResult<JobMap> {
        Ok(self.read_snapshot()?.jobs)
    }

    /// Read the store. Unreadable or corrupt content yields an empty map.
    pub fn load(&self) -> JobMap {
        match self.try_load() {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Job store unreadable, treating as empty"
                );
                JobMap::new()
            }
        }
    }

    /// Snapshot for a read-modify-write. Call with the write lock held.
    ///
    /// I/O errors propagate so a transient read failure never overwrites the
    /// store. A document that is not JSON at all is moved aside to
    /// `<file>.corrupt` and the store starts over empty. Malformed records
    /// still marked `pending` or `processing` are failed in place.
    pub(crate) fn read_for_write(&self) -> StoreResult<Snapshot> {
        let mut snapshot = match self.read_snapshot() {
            Ok(snapshot) => snapshot,
            Err(StoreError::Json(e)) => {
                let aside = self.corrupt_path();
                fs::rename(&self.path, &aside)?;
                warn!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "Job store is not valid JSON, starting empty"
                );
                Snapshot::default()
            }
            Err(e) => return Err(e),
        };
        snapshot.fail_malformed();
        Ok(snapshot)
    }

    fn corrupt_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".corrupt");
        PathBuf::from(name)
    }

    /// Serialize `jobs` into a synced temp file next to the store file.
    pub fn stage(&self, jobs: &JobMap) -> StoreResult<StagedWrite> {
        self.stage_entries(jobs, &RawRecords::new())
    }

    fn stage_entries(&self, jobs: &JobMap, raw: &RawRecords) -> StoreResult<StagedWrite> {
        let dir = self.dir();
        fs::create_dir_all(&dir)?;

        let mut document: BTreeMap<&JobId, Entry<'_>> =
            raw.iter().map(|(id, r)| (id, Entry::Raw(&r.value))).collect();
        document.extend(jobs.iter().map(|(id, job)| (id, Entry::Job(job))));

        let mut bytes = serde_json::to_vec_pretty(&document)?;
        bytes.push(b'\n');

        let mut file = NamedTempFile::new_in(&dir)?;
        file.write_all(&bytes)?;
        file.flush()?;
        file.as_file().sync_all()?;

        Ok(StagedWrite {
            file,
            target: self.path.clone(),
        })
    }

    /// Replace the store file with exactly `jobs`.
    pub fn save(&self, jobs: &JobMap) -> StoreResult<()> {
        self.stage(jobs)?.commit()?;
        debug!(path = %self.path.display(), jobs = jobs.len(), "Job store saved");
        Ok(())
    }

    /// Write `snapshot` back, undecodable records included.
    pub(crate) fn write_snapshot(&self, snapshot: &Snapshot) -> StoreResult<()> {
        self.stage_entries(&snapshot.jobs, &snapshot.raw)?.commit()?;
        debug!(
            path = %self.path.display(),
            jobs = snapshot.jobs.len(),
            malformed = snapshot.raw.len(),
            "Job store saved"
        );
        Ok(())
    }

    /// Read-modify-write under the write lock. Nothing is written if `f` fails.
    pub(crate) fn modify<T>(
        &self,
        f: impl FnOnce(&mut JobMap) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let _guard = self.lock();
        let mut snapshot = self.read_for_write()?;
        let out = f(&mut snapshot.jobs)?;
        self.write_snapshot(&snapshot)?;
        Ok(out)
    }

    /// Set a job's status, validating the transition.
    ///
    /// Entering `processing` resets progress to 0; `completed` forces 100.
    /// `progress` is only applied while processing and never lowers the
    /// stored value. `error` is kept only for `failed`.
    pub fn update(
        &self,
        id: &JobId,
        status: JobStatus,
        progress: Option<u8>,
        error: Option<String>,
    ) -> StoreResult<Job> {
        self.modify(|jobs| {
            let job = job_mut(jobs, id)?;
            // processing -> processing is how callers report progress
            if !(job.status == JobStatus::Processing && status == JobStatus::Processing) {
                job.transition_to(status)?;
            }
            if let Some(progress) = progress {
                job.record_progress(progress);
            }
            if status == JobStatus::Failed {
                job.error = Some(error.unwrap_or_else(|| "unknown error".to_string()));
            }
            Ok(job.clone())
        })
    }

    /// Record a progress sample for a processing job.
    ///
    /// Returns whether the store was written. Samples that do not increase
    /// the stored value, or that arrive for a job no longer processing, are
    /// dropped.
    pub fn update_progress(&self, id: &JobId, progress: u8) -> StoreResult<bool> {
        let _guard = self.lock();
        let mut snapshot = self.read_for_write()?;
        let job = job_mut(&mut snapshot.jobs, id)?;
        if !job.record_progress(progress) {
            return self.finish_read(&snapshot).map(|()| false);
        }
        self.write_snapshot(&snapshot)?;
        Ok(true)
    }

    /// `processing -> completed`, attaching the handler result.
    pub fn complete(&self, id: &JobId, outcome: JobOutcome) -> StoreResult<Job> {
        self.modify(|jobs| {
            let job = job_mut(jobs, id)?;
            job.complete(outcome)?;
            Ok(job.clone())
        })
    }

    /// `processing -> failed` with an error message.
    pub fn fail(&self, id: &JobId, message: impl Into<String>) -> StoreResult<Job> {
        let message = message.into();
        self.modify(|jobs| {
            let job = job_mut(jobs, id)?;
            job.fail(message)?;
            Ok(job.clone())
        })
    }

    /// Add a new pending job.
    pub fn submit(&self, payload: JobPayload) -> StoreResult<Job> {
        self.modify(|jobs| Ok(insert_pending(jobs, payload)))
    }

    /// Claim the first pending job, marking it processing before returning it.
    ///
    /// Returns `None` when nothing is pending, or when another job is still
    /// processing.
    pub fn claim_next(&self) -> StoreResult<Option<Job>> {
        let _guard = self.lock();
        let mut snapshot = self.read_for_write()?;

        if let Some(active) = snapshot.jobs.values().find(|j| j.status == JobStatus::Processing) {
            warn!(job_id = %active.id, "A job is already processing, not claiming another");
            return self.finish_read(&snapshot).map(|()| None);
        }

        let Some(id) = first_pending(&snapshot.jobs) else {
            return self.finish_read(&snapshot).map(|()| None);
        };
        let job = job_mut(&mut snapshot.jobs, &id)?;
        job.begin()?;
        let claimed = job.clone();

        self.write_snapshot(&snapshot)?;
        Ok(Some(claimed))
    }

    /// Persist malformed records failed by [`JobStore::read_for_write`] when
    /// the caller has nothing else to write.
    pub(crate) fn finish_read(&self, snapshot: &Snapshot) -> StoreResult<()> {
        if snapshot.dirty {
            self.write_snapshot(snapshot)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.load().remove(id)
    }

    /// All jobs in submission order.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.load().into_values().collect();
        jobs.sort_by(|a, b| (a.seq, a.created_at, &a.id).cmp(&(b.seq, b.created_at, &b.id)));
        jobs
    }

    pub fn pending_count(&self) -> usize {
        self.load()
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .count()
    }
}

/// Records that could not be decoded, kept verbatim.
pub(crate) type RawRecords = BTreeMap<JobId, RawRecord>;

#[derive(Debug, Clone)]
pub(crate) struct RawRecord {
    pub(crate) value: Value,
    pub(crate) reason: String,
}

/// Decoded view of the store file for read-modify-write.
#[derive(Debug, Default)]
pub(crate) struct Snapshot {
    pub(crate) jobs: JobMap,
    pub(crate) raw: RawRecords,
    /// Set when a malformed record was changed and must be written back.
    pub(crate) dirty: bool,
}

impl Snapshot {
    fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let records: BTreeMap<JobId, Value> = serde_json::from_slice(bytes)?;
        let mut snapshot = Snapshot::default();
        for (id, value) in records {
            match Job::deserialize(&value) {
                Ok(job) => {
                    snapshot.jobs.insert(id, job);
                }
                Err(e) => {
                    debug!(job_id = %id, error = %e, "Malformed job record");
                    snapshot.raw.insert(
                        id,
                        RawRecord {
                            value,
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }
        Ok(snapshot)
    }

    /// Mark every malformed record that is not terminal as `failed`.
    fn fail_malformed(&mut self) {
        for (id, record) in self.raw.iter_mut() {
            let Some(fields) = record.value.as_object_mut() else {
                continue;
            };
            let terminal = matches!(
                fields.get("status").and_then(Value::as_str),
                Some("completed") | Some("failed")
            );
            if terminal {
                continue;
            }
            let message = format!("malformed job record: {}", record.reason);
            warn!(job_id = %id, error = %message, "Failing malformed job record");
            fields.insert("status".into(), Value::from(JobStatus::Failed.as_str()));
            fields.insert("error".into(), Value::from(message));
            fields.insert("finished_at".into(), Value::from(Utc::now().to_rfc3339()));
            self.dirty = true;
        }
    }
}

/// One store record on the way out.
#[derive(Serialize)]
#[serde(untagged)]
enum Entry<'a> {
    Job(&'a Job),
    Raw(&'a Value),
}

pub(crate) fn job_mut<'a>(jobs: &'a mut JobMap, id: &JobId) -> StoreResult<&'a mut Job> {
    jobs.get_mut(id).ok_or_else(|| StoreError::not_found(id))
}

pub(crate) fn insert_pending(jobs: &mut JobMap, payload: JobPayload) -> Job {
    let seq = jobs.values().map(|j| j.seq).max().unwrap_or(0) + 1;
    let job = Job::new(seq, payload);
    jobs.insert(job.id.clone(), job.clone());
    job
}

fn first_pending(jobs: &JobMap) -> Option<JobId> {
    jobs.values()
        .filter(|j| j.status == JobStatus::Pending)
        .min_by(|a, b| (a.seq, a.created_at, &a.id).cmp(&(b.seq, b.created_at, &b.id)))
        .map(|j| j.id.clone())
}

/// Flush the directory entry after a rename. Best effort.
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}
