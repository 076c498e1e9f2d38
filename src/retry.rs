//! Bounded exponential backoff for requests failing below HTTP.
use std::{future::Future, time::Duration};

use crate::Result;

/// How many times, and after which delays, a request is retried after a network error.
///
/// The n-th retry waits `initial_delay * 2^(n-1)`. Errors other than
/// [`Error::Network`](crate::Error::Network) are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
}

impl RetryPolicy {
    /// Default value for [`RetryPolicy::max_retries`].
    pub const DEFAULT_MAX_RETRIES: u32 = 2;
    /// Default value for [`RetryPolicy::initial_delay`].
    pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(15);

    /// Never retry.
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        initial_delay: Duration::ZERO,
    };

    /// Delay before retry number `retry_count` (starting at 1).
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry_count.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            max_retries: RetryPolicy::DEFAULT_MAX_RETRIES,
            initial_delay: RetryPolicy::DEFAULT_INITIAL_DELAY,
        }
    }
}

/// Runs `operation`, retrying it according to `policy` while it fails with a network error.
///
/// Returns the first success, the first non-network error, or the last network error once
/// retries are exhausted.
pub(crate) async fn retry_on_network_error<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry_count = 0;
    loop {
        match operation().await {
            Err(err) if err.is_network() && retry_count < policy.max_retries => {
                retry_count += 1;
                let delay = policy.delay_for(retry_count);
                log::debug!(target: "event_logger",
                            retry_count,
                            delay_ms = delay.as_millis() as u64;
                            "network error, retrying: {}", err);
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}
