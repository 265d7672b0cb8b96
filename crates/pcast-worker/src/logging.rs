//! Structured job logging utilities.
//!
//! Every line logged through a [`JobLogger`] carries the job id and type, so
//! one job's lifecycle can be followed in the worker output.

use tracing::{error, info, warn, Span};

use pcast_models::{Job, JobId, JobType};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    job_type: JobType,
}

impl JobLogger {
    pub fn new(job_id: &JobId, job_type: JobType) -> Self {
        Self {
            job_id: job_id.to_string(),
            job_type,
        }
    }

    pub fn for_job(job: &Job) -> Self {
        Self::new(&job.id, job.job_type())
    }

    /// Log the start of a job.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            "Job started: {}", message
        );
    }

    /// Log a progress update during job execution.
    pub fn log_progress(&self, percent: u8) {
        info!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            progress = percent,
            "Job progress: {}%", percent
        );
    }

    /// Log a warning during job execution.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            "Job warning: {}", message
        );
    }

    /// Log the failure of a job.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            "Job failed: {}", message
        );
    }

    /// Log the completion of a job.
    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            job_type = %self.job_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, JobType::GenerateShort);

        assert_eq!(logger.job_id(), job_id.as_str());
        assert_eq!(logger.job_type(), JobType::GenerateShort);
    }
}
