use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_MAX_SAMPLES: usize = 100;

struct SpeedSample {
    bytes: u64,
    at: Instant,
}

/// Transfer speed over a sliding window of completed chunks.
///
/// Chunks finish in bursts when several workers run at once, so the rate
/// is measured from the first sample in the window to now rather than
/// between consecutive samples.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: VecDeque<SpeedSample>,
    window: Duration,
    max_samples: usize,
    started: Instant,
    total_bytes: u64,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SpeedCalculator {
    /// Creates a calculator.
    ///
    /// - `window`: time window for the rate (default 5 s).
    /// - `max_samples`: retained samples (default 100).
    pub fn new(window: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: VecDeque::new(),
                window: window.unwrap_or(DEFAULT_WINDOW),
                max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES).max(1),
                started: Instant::now(),
                total_bytes: 0,
            }),
        }
    }

    /// Records `bytes` transferred just now.
    pub fn record(&self, bytes: u64) {
        self.record_at(bytes, Instant::now());
    }

    fn record_at(&self, bytes: u64, at: Instant) {
        let Ok(mut s) = self.inner.lock() else {
            return;
        };
        s.total_bytes += bytes;
        s.samples.push_back(SpeedSample { bytes, at });

        let window = s.window;
        while s
            .samples
            .front()
            .is_some_and(|sample| at.duration_since(sample.at) > window)
        {
            s.samples.pop_front();
        }
        while s.samples.len() > s.max_samples {
            s.samples.pop_front();
        }
    }

    /// Bytes recorded since creation.
    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().map(|s| s.total_bytes).unwrap_or(0)
    }

    /// Average rate in bytes/second over the window.
    ///
    /// Returns 0.0 until two samples exist.
    pub fn bytes_per_second(&self) -> f64 {
        let Ok(s) = self.inner.lock() else {
            return 0.0;
        };
        if s.samples.len() < 2 {
            return 0.0;
        }
        let (Some(first), Some(last)) = (s.samples.front(), s.samples.back()) else {
            return 0.0;
        };
        let elapsed = last.at.duration_since(first.at);
        if elapsed.is_zero() {
            return 0.0;
        }
        // The first sample's bytes were transferred before the window opened.
        let bytes: u64 = s.samples.iter().skip(1).map(|sample| sample.bytes).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Average rate since creation, in bytes/second.
    pub fn overall_bytes_per_second(&self) -> f64 {
        let Ok(s) = self.inner.lock() else {
            return 0.0;
        };
        let elapsed = s.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        s.total_bytes as f64 / elapsed
    }

    /// Estimated time to move `remaining_bytes` at the windowed rate.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }
}
