//! Shared data models for the podcast studio backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their payloads and the status state machine
//! - Render tiers, output formats and clip windows
//! - Encoding configuration

pub mod encoding;
pub mod job;
pub mod payload;
pub mod render;

// Re-export common types
pub use encoding::EncodingConfig;
pub use job::{Job, JobId, JobOutcome, JobStatus, JobType, TransitionError};
pub use payload::{
    BackgroundColor, ColorParseError, JobPayload, ShortPayload, UploadDestination, UploadPayload,
    VideoPayload, Visibility,
};
pub use render::{
    Canvas, ClipWindow, ClipWindowError, RenderKind, RenderRequest, RenderTier, VideoFormat,
};
