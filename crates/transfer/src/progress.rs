use std::time::{Duration, Instant};

/// Default reporting step in percentage points.
const DEFAULT_STEP_PERCENT: u8 = 10;

// ---------------------------------------------------------------------------
// ProgressGate
// ---------------------------------------------------------------------------

/// Thins a stream of progress fractions down to coarse percentage steps.
///
/// A report is let through only when progress reaches the next multiple of
/// `step` percentage points, so a long transfer produces at most
/// `100 / step + 1` reports.
#[derive(Debug, Clone)]
pub struct ProgressGate {
    step: u8,
    last_reported: Option<u8>,
}

impl Default for ProgressGate {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_PERCENT)
    }
}

impl ProgressGate {
    /// Creates a gate reporting every `step` percentage points (clamped to 1..=100).
    pub fn new(step: u8) -> Self {
        Self {
            step: step.clamp(1, 100),
            last_reported: None,
        }
    }

    /// Feeds a progress fraction and returns the percentage to report, if any.
    ///
    /// Values are clamped to `[0, 1]`. Reported percentages are multiples of
    /// the step (or 100) and strictly increasing.
    pub fn observe(&mut self, fraction: f64) -> Option<u8> {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let percent = (fraction * 100.0).floor() as u8;
        let bucket = if percent >= 100 {
            100
        } else {
            percent - percent % self.step
        };

        match self.last_reported {
            Some(last) if bucket <= last => None,
            _ => {
                self.last_reported = Some(bucket);
                Some(bucket)
            }
        }
    }

    /// Last percentage let through.
    pub fn last_reported(&self) -> Option<u8> {
        self.last_reported
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
#[derive(Debug, Clone)]
pub struct SpeedCalculator {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 10 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: Vec::new(),
            max_samples: max_samples.unwrap_or(100).max(2),
            window_size: window_size.unwrap_or(Duration::from_secs(10)),
        }
    }

    /// Records `bytes` transferred at the current instant.
    pub fn add_sample(&mut self, bytes: u64) {
        self.add_sample_at(bytes, Instant::now());
    }

    /// Records `bytes` transferred at `timestamp`.
    pub fn add_sample_at(&mut self, bytes: u64, timestamp: Instant) {
        self.samples.push(SpeedSample { bytes, timestamp });

        if let Some(cutoff) = timestamp.checked_sub(self.window_size) {
            self.samples.retain(|s| s.timestamp >= cutoff);
        }

        if self.samples.len() > self.max_samples {
            let excess = self.samples.len() - self.max_samples;
            self.samples.drain(..excess);
        }
    }

    /// Average speed in bytes/second within the window.
    ///
    /// The first sample only anchors the window; its bytes are not counted.
    /// Returns 0.0 with fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.first(), self.samples.last()) else {
            return 0.0;
        };
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if self.samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }

        let bytes: u64 = self.samples[1..].iter().map(|s| s.bytes).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    /// Clears all recorded samples.
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
