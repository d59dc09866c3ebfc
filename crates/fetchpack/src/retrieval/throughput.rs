//! Rolling transfer speed and remaining-time estimate for one run
//!
//! Speed is the mean of the last N instantaneous samples, each sample being
//! the bytes recorded since the previous record divided by the time since
//! that record. The remaining time is the number of unsettled objects times
//! the mean time it took to settle one object so far.
//!
//! [`estimate`](ThroughputEstimator::estimate) only reads recorded state, it
//! never looks at the clock, so repeated calls yield identical labels.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Label returned until enough has been observed to estimate anything
pub const COMPUTING_LABEL: &str = "computing...";

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// Statistics of one run; created fresh per invocation
#[derive(Debug, Clone)]
pub struct RunStatistics {
    pub started_at: Instant,
    pub total_bytes_transferred: u64,
    /// Most recent instantaneous speeds in bytes per second, oldest first
    pub speed_samples: VecDeque<f64>,
}

/// Smoothed speed and ETA, formatted for display
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputEstimate {
    pub speed_label: String,
    pub eta_label: String,
    pub bytes_per_second: Option<f64>,
    pub eta: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ThroughputEstimator {
    stats: RunStatistics,
    window: usize,
    /// Time of the last speed sample boundary
    last_record_at: Instant,
    /// Bytes recorded at the same instant as the previous boundary
    pending_bytes: u64,
    /// Time the most recent object settled, successful or not
    last_settled_at: Option<Instant>,
}

impl ThroughputEstimator {
    /// Start a run now, keeping at most `window` speed samples (minimum 1)
    pub fn new(window: usize) -> Self {
        Self::starting_at(window, Instant::now())
    }

    pub fn starting_at(window: usize, now: Instant) -> Self {
        let window = window.max(1);
        Self {
            stats: RunStatistics {
                started_at: now,
                total_bytes_transferred: 0,
                speed_samples: VecDeque::with_capacity(window),
            },
            window,
            last_record_at: now,
            pending_bytes: 0,
            last_settled_at: None,
        }
    }

    /// Record bytes of an object that just finished transferring
    pub fn record(&mut self, bytes_just_transferred: u64) {
        self.record_at(bytes_just_transferred, Instant::now());
    }

    pub fn record_at(&mut self, bytes_just_transferred: u64, now: Instant) {
        self.stats.total_bytes_transferred += bytes_just_transferred;
        self.last_settled_at = Some(now);

        let elapsed = now.saturating_duration_since(self.last_record_at).as_secs_f64();
        let bytes = self.pending_bytes + bytes_just_transferred;
        if elapsed <= 0.0 {
            // No time has passed: fold into the next sample instead of dividing by zero
            self.pending_bytes = bytes;
            return;
        }

        if self.stats.speed_samples.len() == self.window {
            self.stats.speed_samples.pop_front();
        }
        self.stats.speed_samples.push_back(bytes as f64 / elapsed);
        self.pending_bytes = 0;
        self.last_record_at = now;
    }

    /// Note that an object settled without transferring bytes (a failure)
    pub fn mark_settled(&mut self) {
        self.mark_settled_at(Instant::now());
    }

    pub fn mark_settled_at(&mut self, now: Instant) {
        self.last_settled_at = Some(now);
    }

    /// Mean of the buffered speed samples
    pub fn average_speed(&self) -> Option<f64> {
        let samples = &self.stats.speed_samples;
        if samples.is_empty() {
            None
        } else {
            Some(samples.iter().sum::<f64>() / samples.len() as f64)
        }
    }

    /// Estimate speed and remaining time given `completed` of `total` objects settled
    pub fn estimate(&self, completed: usize, total: usize) -> ThroughputEstimate {
        let bytes_per_second = self.average_speed();
        let eta = self.remaining_time(completed, total);

        ThroughputEstimate {
            speed_label: bytes_per_second.map_or_else(|| COMPUTING_LABEL.to_string(), format_speed),
            eta_label: eta.map_or_else(|| COMPUTING_LABEL.to_string(), format_eta),
            bytes_per_second,
            eta,
        }
    }

    fn remaining_time(&self, completed: usize, total: usize) -> Option<Duration> {
        let remaining = total.saturating_sub(completed);
        if remaining == 0 {
            return Some(Duration::ZERO);
        }
        if completed == 0 {
            return None;
        }
        let elapsed = self.last_settled_at?.saturating_duration_since(self.stats.started_at);
        let per_object = elapsed.as_secs_f64() / completed as f64;
        Some(Duration::from_secs_f64(per_object * remaining as f64))
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.stats
    }

    pub fn total_bytes(&self) -> u64 {
        self.stats.total_bytes_transferred
    }
}

/// Format a transfer speed in binary units (B/s, KB/s, MB/s, GB/s)
pub fn format_speed(bytes_per_second: f64) -> String {
    let bps = bytes_per_second.max(0.0);
    if bps < KIB {
        format!("{:.0} B/s", bps)
    } else if bps < MIB {
        format!("{:.1} KB/s", bps / KIB)
    } else if bps < GIB {
        format!("{:.1} MB/s", bps / MIB)
    } else {
        format!("{:.2} GB/s", bps / GIB)
    }
}

/// Format a remaining time as seconds, minutes or hours
pub fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs_f64().ceil() as u64;
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn computing_before_first_sample() {
        let estimator = ThroughputEstimator::new(10);
        let estimate = estimator.estimate(0, 5);
        assert_eq!(estimate.speed_label, COMPUTING_LABEL);
        assert_eq!(estimate.eta_label, COMPUTING_LABEL);
        assert!(estimate.bytes_per_second.is_none());
    }

    #[test]
    fn zero_elapsed_time_does_not_divide_by_zero() {
        let start = Instant::now();
        let mut estimator = ThroughputEstimator::starting_at(10, start);

        estimator.record_at(MB, start);
        assert!(estimator.statistics().speed_samples.is_empty());
        assert_eq!(estimator.estimate(1, 2).speed_label, COMPUTING_LABEL);

        // The folded bytes count towards the next sample
        estimator.record_at(MB, start + Duration::from_secs(2));
        assert_eq!(estimator.average_speed(), Some(MB as f64));
        assert_eq!(estimator.total_bytes(), 2 * MB);
    }

    #[test]
    fn speed_and_eta_from_samples() {
        let start = Instant::now();
        let mut estimator = ThroughputEstimator::starting_at(10, start);

        estimator.record_at(2 * MB, start + Duration::from_secs(1));
        estimator.record_at(4 * MB, start + Duration::from_secs(2));

        let estimate = estimator.estimate(2, 6);
        assert_eq!(estimate.speed_label, "3.0 MB/s");
        // 1s per object, 4 objects left
        assert_eq!(estimate.eta, Some(Duration::from_secs(4)));
        assert_eq!(estimate.eta_label, "4s");
    }

    #[test]
    fn estimate_is_idempotent() {
        let start = Instant::now();
        let mut estimator = ThroughputEstimator::starting_at(10, start);
        estimator.record_at(700 * 1024, start + Duration::from_millis(1500));
        estimator.mark_settled_at(start + Duration::from_secs(3));

        let first = estimator.estimate(2, 10);
        let second = estimator.estimate(2, 10);
        assert_eq!(first, second);
    }

    #[test]
    fn ring_buffer_keeps_latest_samples() {
        let start = Instant::now();
        let mut estimator = ThroughputEstimator::starting_at(2, start);

        estimator.record_at(100, start + Duration::from_secs(1));
        estimator.record_at(200, start + Duration::from_secs(2));
        estimator.record_at(400, start + Duration::from_secs(3));

        let samples: Vec<f64> = estimator.statistics().speed_samples.iter().copied().collect();
        assert_eq!(samples, vec![200.0, 400.0]);
        assert_eq!(estimator.estimate(3, 3).speed_label, "300 B/s");
    }

    #[test]
    fn failures_count_toward_eta_timing() {
        let start = Instant::now();
        let mut estimator = ThroughputEstimator::starting_at(10, start);
        estimator.record_at(MB, start + Duration::from_secs(1));
        estimator.mark_settled_at(start + Duration::from_secs(4));

        // 2 settled in 4s, 2 left
        assert_eq!(estimator.estimate(2, 4).eta, Some(Duration::from_secs(4)));
    }

    #[test]
    fn finished_run_has_zero_eta() {
        let estimator = ThroughputEstimator::new(10);
        assert_eq!(estimator.estimate(3, 3).eta_label, "0s");
    }

    #[test]
    fn speed_units() {
        assert_eq!(format_speed(512.0), "512 B/s");
        assert_eq!(format_speed(1536.0), "1.5 KB/s");
        assert_eq!(format_speed(5.0 * MB as f64), "5.0 MB/s");
        assert_eq!(format_speed(3.0 * 1024.0 * MB as f64), "3.00 GB/s");
    }

    #[test]
    fn eta_units() {
        assert_eq!(format_eta(Duration::from_millis(12_300)), "13s");
        assert_eq!(format_eta(Duration::from_secs(185)), "3m 05s");
        assert_eq!(format_eta(Duration::from_secs(2 * 3600 + 7 * 60)), "2h 07m");
    }
}
