//! Retry policy with exponential backoff and full jitter.
//!
//! After the n-th transient failure (n starting at 1) the caller
//! sleeps a delay drawn uniformly from `[0, 2^n)` units. Drawing from the
//! whole interval keeps concurrent uploads from retrying in lockstep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{info_span, warn, Instrument};

use crate::error::{YoutubeError, YoutubeResult};
use crate::metrics::record_retry;

/// Default retry budget for uploads.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default backoff unit.
pub const DEFAULT_UNIT: Duration = Duration::from_secs(1);

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Transient failures tolerated per operation; reaching it is fatal.
    pub max_retries: u32,
    /// Backoff time unit.
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            unit: DEFAULT_UNIT,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, unit: Duration) -> Self {
        Self { max_retries, unit }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let max_retries = std::env::var("CLIPSYNC_UPLOAD_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);

        let unit_ms: u64 = std::env::var("CLIPSYNC_RETRY_UNIT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_UNIT.as_millis() as u64);

        Self {
            max_retries,
            unit: Duration::from_millis(unit_ms),
        }
    }

    /// Exclusive upper bound of the delay before retry number `retry`.
    pub fn delay_bound(&self, retry: u32) -> Duration {
        self.unit.saturating_mul(2u32.saturating_pow(retry))
    }

    /// Delay drawn uniformly from `[0, delay_bound(retry))`.
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let bound = self.delay_bound(retry).as_nanos().min(u64::MAX as u128) as u64;
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::rng().random_range(0..bound))
    }

    /// Account for one more transient failure.
    ///
    /// Returns the retry number to back off for, or `RetriesExhausted` once
    /// the budget is spent.
    pub fn next_retry(&self, failures_so_far: u32, error: &YoutubeError) -> YoutubeResult<u32> {
        let retry = failures_so_far + 1;
        if retry >= self.max_retries {
            return Err(YoutubeError::RetriesExhausted {
                retries: failures_so_far,
                last_error: error.to_string(),
            });
        }
        Ok(retry)
    }
}

/// Execute an async request with retry on transient errors.
///
/// Used for small idempotent calls such as search; uploads drive their own
/// state machine in [`crate::upload`].
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, op: F) -> YoutubeResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = YoutubeResult<T>>,
{
    let mut failures = 0u32;

    loop {
        let span = info_span!("youtube_retry", operation = %operation, attempt = failures + 1);

        match op().instrument(span).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                let retry = policy.next_retry(failures, &e)?;
                let delay = policy.jittered_delay(retry);

                warn!(
                    operation = %operation,
                    retry,
                    delay_ms = delay.as_millis() as u64,
                    "YouTube request failed, retrying: {}",
                    e
                );

                record_retry(operation);
                failures = retry;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
