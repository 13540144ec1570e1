//! Bounded retry for transient SQLite contention.

use std::time::Duration;

use serverdb_core::Result;
use tracing::warn;

use crate::error::is_busy;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 8;
/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(10);
/// Default cap for a single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(200);

/// How often and how patiently busy/locked failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry; grows linearly with each attempt.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (starting at 1).
    ///
    /// Formula: `min(max_delay, base_delay * attempt)`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt).min(self.max_delay)
    }
}

/// Runs `f`, retrying while it fails because the database is busy.
///
/// Other failures, and the last busy failure once the retries are used up,
/// are returned as they are.
pub(crate) fn retry_on_busy<T>(policy: &RetryPolicy, mut f: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempts = 0;
    loop {
        match f() {
            Err(err) if is_busy(&err) && attempts < policy.max_retries => {
                attempts += 1;
                let delay = policy.delay(attempts);
                warn!(
                    attempt = attempts,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "SQLite database busy, retrying"
                );
                std::thread::sleep(delay);
            }
            other => return other,
        }
    }
}
