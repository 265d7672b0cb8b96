//! Upload job processing and input archiving.

use std::path::{Path, PathBuf};

use pcast_media::move_into;
use pcast_models::{Job, JobOutcome, JobPayload, UploadDestination, UploadPayload};

use crate::credentials::load_credentials;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::uploader::{HostingUploader, VideoPlatformUploader};

fn upload_payload(job: &Job) -> WorkerResult<&UploadPayload> {
    match &job.payload {
        JobPayload::Upload(p) => Ok(p),
        _ => Err(WorkerError::internal(format!(
            "job {} is not an upload job",
            job.id
        ))),
    }
}

/// Publish the job's file to its destination.
///
/// No retries: a rejected or failed upload fails the job.
pub async fn process_upload_job(
    job: &Job,
    hosting: &dyn HostingUploader,
    video: &dyn VideoPlatformUploader,
    secrets_path: &Path,
) -> WorkerResult<JobOutcome> {
    let logger = JobLogger::for_job(job);
    let payload = upload_payload(job)?;

    if !payload.file_path.is_file() {
        return Err(WorkerError::InputMissing(payload.file_path.clone()));
    }

    match payload.destination {
        UploadDestination::Hosting => {
            let credentials = load_credentials(secrets_path).await?;
            logger.log_start(&format!(
                "hosting upload of {}",
                payload.file_path.display()
            ));
            let accepted = hosting
                .upload(
                    &credentials,
                    &payload.file_path,
                    &payload.title,
                    &payload.description,
                )
                .await?;
            if !accepted {
                return Err(WorkerError::upload_failed("upload returned false"));
            }
            Ok(JobOutcome::default())
        }
        UploadDestination::VideoPlatform => {
            logger.log_start(&format!(
                "video platform upload of {} ({})",
                payload.file_path.display(),
                payload.visibility
            ));
            let url = video
                .upload(
                    &payload.file_path,
                    &payload.title,
                    &payload.description,
                    payload.visibility,
                )
                .await?;
            if url.trim().is_empty() {
                return Err(WorkerError::upload_failed("video platform returned no URL"));
            }
            Ok(JobOutcome::with_url(url))
        }
    }
}

/// Move an upload job's input into the processed or failed archive.
///
/// Returns the archived path, or `None` when nothing was moved. Failures are
/// logged and never affect the job record.
pub async fn archive_upload_input(
    job: &Job,
    succeeded: bool,
    processed_dir: &Path,
    failed_dir: &Path,
) -> Option<PathBuf> {
    let JobPayload::Upload(payload) = &job.payload else {
        return None;
    };
    if !payload.file_path.is_file() {
        return None;
    }

    let logger = JobLogger::for_job(job);
    let dir = if succeeded { processed_dir } else { failed_dir };
    match move_into(&payload.file_path, dir).await {
        Ok(archived) => {
            tracing::info!(
                job_id = %job.id,
                archived = %archived.display(),
                "Archived upload input"
            );
            Some(archived)
        }
        Err(e) => {
            logger.log_warning(&format!(
                "could not archive {}: {}",
                payload.file_path.display(),
                e
            ));
            None
        }
    }
}
