//! Durable job record store.
//!
//! This crate provides:
//! - A single JSON document of job records, replaced atomically on every write
//! - Status updates validated against the job state machine
//! - Submission, first-pending claiming and start-up crash recovery

pub mod error;
pub mod recovery;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use recovery::RecoveryPolicy;
pub use store::{JobMap, JobStore, StagedWrite, DEFAULT_STORE_FILE};
