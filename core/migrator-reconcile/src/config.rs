//! Tunables for validation runs and the repair consumer.

use crate::backoff::Backoff;
use std::time::Duration;

/// Shortest pause between passes of a continuous validation.
pub const MIN_SLEEP_INTERVAL: Duration = Duration::from_millis(200);

/// Configuration for a [`Validator`](crate::Validator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Ids per page when scanning target against base.
    pub batch_size: usize,
    /// Only rows with `utime` strictly greater than this are scanned.
    pub utime: i64,
    /// Zero runs one pass; anything else repeats forever, pausing this long
    /// whenever the changed range is exhausted.
    pub sleep_interval: Duration,
    /// Time box for each individual store call.
    pub query_timeout: Duration,
    /// Consecutive failures on one cursor position before the failure is
    /// escalated to an error log. The cursor never skips a failing row.
    pub max_retry: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            utime: 0,
            sleep_interval: Duration::ZERO,
            query_timeout: Duration::from_secs(1),
            max_retry: 10,
            backoff_base: Duration::from_millis(50),
            backoff_max: Duration::from_secs(5),
        }
    }
}

impl ValidatorConfig {
    #[must_use]
    pub fn with_utime(mut self, utime: i64) -> Self {
        self.utime = utime;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the pause between passes, clamping non-zero values to
    /// [`MIN_SLEEP_INTERVAL`].
    #[must_use]
    pub fn with_sleep_interval(mut self, interval: Duration) -> Self {
        self.sleep_interval = interval;
        self.normalized()
    }

    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Applies the clamps every run relies on.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if !self.sleep_interval.is_zero() {
            self.sleep_interval = self.sleep_interval.max(MIN_SLEEP_INTERVAL);
        }
        self.batch_size = self.batch_size.max(1);
        self
    }

    /// Whether the run repeats instead of stopping after one pass.
    pub fn is_continuous(&self) -> bool {
        !self.sleep_interval.is_zero()
    }

    pub(crate) fn backoff(&self) -> Backoff {
        Backoff::new(self.backoff_base, self.backoff_max)
    }
}

/// Configuration for a [`Consumer`](crate::Consumer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Retries per event after the first failed fix.
    pub max_retries: u32,
    /// Time box for one fix.
    pub fix_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            fix_timeout: Duration::from_secs(1),
            backoff_base: Duration::from_millis(50),
            backoff_max: Duration::from_secs(5),
        }
    }
}

impl ConsumerConfig {
    pub(crate) fn backoff(&self) -> Backoff {
        Backoff::new(self.backoff_base, self.backoff_max)
    }
}
