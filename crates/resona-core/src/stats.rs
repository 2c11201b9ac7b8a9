//! Rolling render-time statistics.
//!
//! Every engine keeps a window of its most recent block timings and derives
//! an average, a peak, and a CPU load figure from it. CPU load is the
//! average render time divided by the duration of one block at the
//! configured sample rate.

use std::collections::VecDeque;

/// Number of block timings kept in the rolling window.
pub const STATS_WINDOW: usize = 100;

/// Aggregated view of recent render performance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceReport {
    /// Average render time over the window, in milliseconds.
    pub average_ms: f64,
    /// Peak render time over the window, in milliseconds.
    pub peak_ms: f64,
    /// Average render time as a percentage of the block duration.
    pub cpu_percent: f64,
}

/// Rolling window of block render timings.
#[derive(Debug)]
pub struct RenderStats {
    timings_ms: VecDeque<f64>,
}

impl RenderStats {
    /// Creates an empty window.
    pub fn new() -> Self {
        Self {
            timings_ms: VecDeque::with_capacity(STATS_WINDOW),
        }
    }

    /// Records one block render time in milliseconds.
    pub fn record(&mut self, elapsed_ms: f64) {
        if self.timings_ms.len() == STATS_WINDOW {
            self.timings_ms.pop_front();
        }
        self.timings_ms.push_back(elapsed_ms);
    }

    /// Discards all recorded timings.
    pub fn reset(&mut self) {
        self.timings_ms.clear();
    }

    /// Builds a report against a block of `block_size` frames at `sample_rate`.
    pub fn report(&self, block_size: usize, sample_rate: f32) -> PerformanceReport {
        if self.timings_ms.is_empty() || sample_rate <= 0.0 || block_size == 0 {
            return PerformanceReport::default();
        }
        let sum: f64 = self.timings_ms.iter().sum();
        let average_ms = sum / self.timings_ms.len() as f64;
        let peak_ms = self.timings_ms.iter().copied().fold(0.0, f64::max);
        let block_ms = block_size as f64 / f64::from(sample_rate) * 1000.0;
        PerformanceReport {
            average_ms,
            peak_ms,
            cpu_percent: average_ms / block_ms * 100.0,
        }
    }
}

impl Default for RenderStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_reports_zero() {
        let stats = RenderStats::new();
        assert_eq!(stats.report(256, 48000.0), PerformanceReport::default());
    }

    #[test]
    fn average_and_peak() {
        let mut stats = RenderStats::new();
        stats.record(1.0);
        stats.record(3.0);
        let report = stats.report(480, 48000.0);
        assert!((report.average_ms - 2.0).abs() < 1e-9);
        assert!((report.peak_ms - 3.0).abs() < 1e-9);
        // 480 frames @ 48 kHz = 10 ms blocks; 2 ms average = 20% CPU.
        assert!((report.cpu_percent - 20.0).abs() < 1e-9);
    }

    #[test]
    fn window_drops_oldest() {
        let mut stats = RenderStats::new();
        stats.record(100.0);
        for _ in 0..STATS_WINDOW {
            stats.record(1.0);
        }
        let report = stats.report(480, 48000.0);
        assert!((report.peak_ms - 1.0).abs() < 1e-9);
    }
}
