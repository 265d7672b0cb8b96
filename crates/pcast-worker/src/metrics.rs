//! Prometheus metrics for the worker.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

use pcast_models::{JobType, RenderTier};

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_CLAIMED_TOTAL: &str = "pcast_jobs_claimed_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "pcast_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "pcast_jobs_failed_total";
    pub const JOBS_RECOVERED_TOTAL: &str = "pcast_jobs_recovered_total";
    pub const JOBS_PENDING: &str = "pcast_jobs_pending";
    pub const RENDER_DURATION_SECONDS: &str = "pcast_render_duration_seconds";
}

/// Install the Prometheus exporter, serving `/metrics` on `port`.
///
/// Must be called from within a tokio runtime.
pub fn install_exporter(port: u16) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

pub fn record_claimed(job_type: JobType) {
    counter!(names::JOBS_CLAIMED_TOTAL, "type" => job_type.as_str()).increment(1);
}

pub fn record_completed(job_type: JobType) {
    counter!(names::JOBS_COMPLETED_TOTAL, "type" => job_type.as_str()).increment(1);
}

pub fn record_failed(job_type: JobType) {
    counter!(names::JOBS_FAILED_TOTAL, "type" => job_type.as_str()).increment(1);
}

pub fn record_recovered(count: usize) {
    counter!(names::JOBS_RECOVERED_TOTAL).increment(count as u64);
}

pub fn set_pending(count: usize) {
    gauge!(names::JOBS_PENDING).set(count as f64);
}

pub fn record_render_duration(tier: RenderTier, seconds: f64) {
    histogram!(names::RENDER_DURATION_SECONDS, "tier" => tier.as_str()).record(seconds);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        for name in [
            names::JOBS_CLAIMED_TOTAL,
            names::JOBS_COMPLETED_TOTAL,
            names::JOBS_FAILED_TOTAL,
            names::JOBS_RECOVERED_TOTAL,
        ] {
            assert!(name.starts_with("pcast_jobs_"));
            assert!(name.ends_with("_total"));
        }
        assert!(names::RENDER_DURATION_SECONDS.ends_with("_seconds"));
    }
}
