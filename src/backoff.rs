//! Capped equal-jitter backoff sequence for construction retries

use std::time::Duration;

/// Lazy cursor over a bounded, jittered exponential delay sequence.
///
/// For the 0-based attempt index `i` the deadline is drawn uniformly from
/// `[half, 2 * half)` where `half = min(cap, step * 2^i) / 2`, so no value
/// ever exceeds `cap`. The cursor yields exactly `limit` values and lives
/// only as long as one retrying construction attempt.
#[derive(Debug)]
pub(crate) struct Backoff {
    step: Duration,
    cap: Duration,
    remaining: usize,
    attempt: u32,
}

impl Backoff {
    pub(crate) fn new(step: Duration, cap: Duration, limit: usize) -> Self {
        Self {
            step,
            cap,
            remaining: limit,
            attempt: 0,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let factor = 1u32 << self.attempt.min(31);
        self.attempt = self.attempt.saturating_add(1);

        let ceiling = self.cap.min(self.step.saturating_mul(factor));
        let half = ceiling / 2;
        Some(half + half.mul_f64(rand::random::<f64>()))
    }
}
