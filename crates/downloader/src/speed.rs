//! Transfer speed over a sliding window, for progress reporting.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding-window bytes/sec and ETA calculator.
pub struct SpeedCalculator {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl SpeedCalculator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Records bytes transferred just now.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    fn record_at(&mut self, at: Instant, bytes: u64) {
        self.samples.push_back((at, bytes));
        self.prune(at);
    }

    /// Current transfer rate over the window.
    pub fn bytes_per_sec(&mut self) -> f64 {
        let now = Instant::now();
        self.prune(now);
        let total: u64 = self.samples.iter().map(|(_, b)| b).sum();
        if total == 0 {
            return 0.0;
        }
        // Measure over the actual span covered, capped at the window, so
        // a burst right after start does not read as a crawl.
        let span = self
            .samples
            .front()
            .map(|(at, _)| now.duration_since(*at))
            .unwrap_or(self.window)
            .max(Duration::from_millis(1));
        total as f64 / span.as_secs_f64()
    }

    /// Estimated time to transfer `remaining` bytes at the current rate.
    ///
    /// `None` when the rate is zero (no basis for an estimate).
    pub fn eta(&mut self, remaining: u64) -> Option<Duration> {
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    fn prune(&mut self, now: Instant) {
        while let Some((at, _)) = self.samples.front() {
            if now.duration_since(*at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}
