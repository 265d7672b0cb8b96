//! Podcast publishing worker.
//!
//! This crate provides:
//! - The single-threaded job executor over the job store
//! - Render and upload job handlers
//! - Command-backed hosting and video platform uploaders
//! - Archiving of upload inputs
//! - Per-job structured logging and Prometheus metrics

pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod render_job;
pub mod upload_job;
pub mod uploader;

pub use config::{ExternalCommand, WorkerConfig};
pub use credentials::{load_credentials, Credentials};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use uploader::{
    CommandHostingUploader, CommandVideoPlatformUploader, HostingUploader, VideoPlatformUploader,
};
