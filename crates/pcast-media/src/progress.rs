//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Calculate progress percentage given total duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).clamp(0.0, 100.0)
    }
}

/// Converts raw progress samples into percentages for a job.
///
/// While ffmpeg runs, reported values stay at or below 99 and only ever
/// increase; 100 is reported by the caller once ffmpeg has exited cleanly.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_ms: i64,
    last: u8,
}

impl ProgressTracker {
    pub const RUNNING_CAP: u8 = 99;

    pub fn new(total_seconds: f64) -> Self {
        let total_ms = if total_seconds.is_finite() && total_seconds > 0.0 {
            (total_seconds * 1000.0).round() as i64
        } else {
            0
        };
        Self { total_ms, last: 0 }
    }

    /// Percentage to report for `sample`, or `None` if it is not an increase.
    pub fn observe(&mut self, sample: &FfmpegProgress) -> Option<u8> {
        if self.total_ms <= 0 {
            return None;
        }
        let pct = (sample.percentage(self.total_ms).floor() as u8).min(Self::RUNNING_CAP);
        if pct <= self.last {
            return None;
        }
        self.last = pct;
        Some(pct)
    }
}

/// Parse `HH:MM:SS.fraction` into milliseconds.
pub fn parse_clock(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.starts_with('-') {
        return None;
    }
    let mut parts = value.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    Some(hours * 3_600_000 + minutes * 60_000 + (seconds * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> FfmpegProgress {
        FfmpegProgress {
            out_time_ms: ms,
            ..Default::default()
        }
    }

    #[test]
    fn test_progress_percentage() {
        assert!((at(5000).percentage(10000) - 50.0).abs() < 0.01);
        assert!((at(5000).percentage(5000) - 100.0).abs() < 0.01);
        assert_eq!(at(5000).percentage(0), 0.0);
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("00:00:05.12"), Some(5120));
        assert_eq!(parse_clock("01:02:03.500000"), Some(3_723_500));
        assert_eq!(parse_clock("N/A"), None);
        assert_eq!(parse_clock("-577014:32:22.77"), None);
        assert_eq!(parse_clock("00:75:00.00"), None);
    }

    #[test]
    fn test_tracker_caps_while_running() {
        let mut tracker = ProgressTracker::new(30.0);
        assert_eq!(tracker.observe(&at(15_000)), Some(50));
        assert_eq!(tracker.observe(&at(30_000)), Some(99));
        assert_eq!(tracker.observe(&at(31_000)), None);
    }

    #[test]
    fn test_tracker_reports_only_increases() {
        let mut tracker = ProgressTracker::new(10.0);
        let reported: Vec<u8> = [1000, 900, 1000, 2500, 2000, 9000]
            .into_iter()
            .filter_map(|ms| tracker.observe(&at(ms)))
            .collect();
        assert_eq!(reported, vec![10, 25, 90]);
    }

    #[test]
    fn test_tracker_without_duration_is_silent() {
        let mut tracker = ProgressTracker::new(0.0);
        assert_eq!(tracker.observe(&at(5000)), None);
        let mut tracker = ProgressTracker::new(f64::NAN);
        assert_eq!(tracker.observe(&at(5000)), None);
    }
}
