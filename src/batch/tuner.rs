//! Companion metrics loop for batch sizing.
//!
//! The processor itself is agnostic to batch size — it pulls whatever is
//! queued.  [`BatchSizeTuner`] lives outside it: callers feed it the
//! observed average latency and error rate of recent batches, and consult
//! [`preferred`](BatchSizeTuner::preferred) when grouping new work.  Size
//! nudges down when latency crosses `slow_threshold`, up when latency is
//! comfortably low and errors are rare.

use std::time::Duration;

/// Error rate below which a batch run counts as "errors rare".
const LOW_ERROR_RATE: f32 = 0.05;

/// Observed-latency driven batch size recommendation.
pub struct BatchSizeTuner {
    preferred: usize,
    min: usize,
    max: usize,
    slow_threshold: Duration,
}

impl BatchSizeTuner {
    /// `initial` is also the cap's midpoint: sizes stay in `[1, initial × 4]`.
    pub fn new(initial: usize, slow_threshold: Duration) -> Self {
        let initial = initial.max(1);
        Self {
            preferred: initial,
            min: 1,
            max: initial * 4,
            slow_threshold,
        }
    }

    /// Currently recommended batch size.
    pub fn preferred(&self) -> usize {
        self.preferred
    }

    /// Feed one observation window.
    ///
    /// * latency above `slow_threshold` → shrink by one.
    /// * latency under half the threshold with a low error rate → grow by
    ///   one.
    /// * anything in between leaves the size alone.
    pub fn observe(&mut self, avg_latency: Duration, error_rate: f32) {
        if avg_latency > self.slow_threshold {
            if self.preferred > self.min {
                self.preferred -= 1;
                log::debug!(
                    "batch tuner: slow ({} ms) → size {}",
                    avg_latency.as_millis(),
                    self.preferred
                );
            }
        } else if avg_latency < self.slow_threshold / 2
            && error_rate < LOW_ERROR_RATE
            && self.preferred < self.max
        {
            self.preferred += 1;
            log::debug!(
                "batch tuner: fast ({} ms) → size {}",
                avg_latency.as_millis(),
                self.preferred
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
