//! Retry policy shared by the envelope client and the download manager
//!
//! One policy object carries the attempt bound, the backoff curve and the
//! jitter. Whether a failure is retryable is decided by the caller through a
//! predicate so both HTTP layers classify errors the same way.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::limits;

/// Bounded exponential backoff with jitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the second attempt
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Backoff cap
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Jitter as a fraction of the computed delay (0.0-1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: limits::MAX_ATTEMPTS,
            base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_secs(limits::MAX_BACKOFF_SECS),
            jitter: limits::BACKOFF_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    ///
    /// Attempt `n` waits `base * 2^(n-1)`, capped at `max_delay`, then
    /// shifted by up to `jitter` of itself in either direction.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let base_millis = self.base_delay.as_millis() as u64;
        let exponential = base_millis.saturating_mul(1u64 << exponent);
        let capped = exponential.min(self.max_delay.as_millis() as u64);

        let jitter_range = (capped as f64 * self.jitter.clamp(0.0, 1.0)) as u64;
        let jittered = if jitter_range > 0 {
            let offset = fastrand::u64(0..=jitter_range * 2);
            (capped + offset).saturating_sub(jitter_range)
        } else {
            capped
        };

        Duration::from_millis(jittered)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out
    ///
    /// The operation receives the 1-based attempt number. The last error is
    /// returned unchanged when the policy gives up.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut operation: F,
        is_retryable: P,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < max_attempts && is_retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}ms",
                        label,
                        attempt,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
