//! Store error types.

use pcast_models::{JobId, TransitionError};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing the job store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to replace store file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}

impl StoreError {
    pub fn not_found(id: &JobId) -> Self {
        Self::JobNotFound(id.clone())
    }
}
