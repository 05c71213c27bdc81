use std::time::Duration;

/// Capped exponential backoff for retrying a failing step.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempts: 0,
        }
    }

    /// Delay before the next retry; doubles each call up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let shift = self.attempts.min(20);
        self.attempts = self.attempts.saturating_add(1);
        self.base.saturating_mul(1 << shift).min(self.max)
    }

    /// Failures since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
