//! Exponential backoff retry logic for directory operations.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{RemoteError, SyncError, SyncResult};

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one (default: 7).
    pub max_attempts: u32,
    /// Base delay for exponential backoff (default: 500ms).
    pub base_delay: Duration,
    /// Maximum delay cap (default: 30s).
    pub max_delay: Duration,
    /// Exclusive upper bound of the random jitter (default: 350ms).
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::from_millis(350),
        }
    }
}

/// Doubling stops after this many steps.
const MAX_DOUBLINGS: u32 = 6;

impl RetryPolicy {
    /// Creates a policy optimized for testing (millisecond delays).
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            max_attempts: 7,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            max_jitter: Duration::ZERO,
        }
    }

    /// Backoff before the retry that follows failed attempt `attempt`
    /// (1-indexed), without jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_DOUBLINGS);
        self.base_delay.saturating_mul(1 << exponent)
    }

    /// Full delay after failed attempt `attempt`: capped backoff plus jitter,
    /// raised to the server's retry-after hint when that is longer.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = (self.backoff(attempt) + self.jitter()).min(self.max_delay);
        retry_after.map_or(computed, |hint| computed.max(hint))
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }

    /// Executes an async operation with retry.
    ///
    /// `f` is called until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` calls have failed. `key` identifies the entity in logs
    /// and errors (an email, a group/user pair).
    pub async fn with_retry<F, Fut, T>(&self, operation: &str, key: &str, mut f: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt: u32 = 1;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, key, attempt, "Operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() => {
                    return Err(SyncError::NonRetryable {
                        operation: operation.to_string(),
                        key: key.to_string(),
                        attempt,
                        source: error,
                    });
                }
                Err(error) if attempt >= max_attempts => {
                    warn!(
                        operation,
                        key,
                        attempts = attempt,
                        error = %error,
                        "Max retries exceeded"
                    );
                    return Err(SyncError::RetriesExhausted {
                        operation: operation.to_string(),
                        key: key.to_string(),
                        attempts: attempt,
                        source: error,
                    });
                }
                Err(error) => {
                    let delay = self.delay_for(attempt, error.retry_after);
                    warn!(
                        operation,
                        key,
                        attempt,
                        max_attempts,
                        status = ?error.status,
                        sleep_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
