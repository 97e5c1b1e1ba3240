//! Store retry logic
//!
//! Bounded exponential backoff for transient store contention (SQLite busy /
//! locked). Any other error is returned on the spot.

use std::thread;
use std::time::Duration;

use crate::error::{IngestError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff before attempt `attempt + 1`: base × 2^(attempt-1), capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails with a non-transient error, or
/// `policy.max_attempts` transient failures have happened.
///
/// The closure receives the 1-based attempt number.
pub fn retry_on_lock<T, F>(operation_name: &str, policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt) {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Store operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => {
                if attempt >= max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Store still locked, giving up"
                    );
                    return Err(IngestError::LockRetryExhausted {
                        operation: operation_name.to_string(),
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                }

                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    "Store locked, will retry after backoff"
                );
                thread::sleep(delay);
            }
        }
    }
}
