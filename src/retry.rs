//! Bounded retry with exponential, jittered backoff.
//!
//! Attempt `i` (0-indexed) that fails before the last attempt is followed
//! by a pause of `min(base × 2^i, max)`, plus a uniform `[0, 1)` second
//! jitter when enabled. The failure of the final attempt is returned to
//! the caller unchanged.
//!
//! ```rust
//! use std::time::Duration;
//! use conquerx::retry::RetryPolicy;
//!
//! let policy = RetryPolicy {
//!     max_attempts: 5,
//!     base_delay: Duration::from_secs(1),
//!     max_delay: Duration::from_secs(3),
//!     jitter: false,
//! };
//! assert_eq!(policy.delay_for(0), Duration::from_secs(1));
//! assert_eq!(policy.delay_for(1), Duration::from_secs(2));
//! assert_eq!(policy.delay_for(2), Duration::from_secs(3)); // capped
//! ```

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    /// Deterministic part of the pause after failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(31);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn pause_for(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if self.jitter {
            delay + Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..1.0))
        } else {
            delay
        }
    }
}

/// Run `op` under `policy`, pausing with `tokio::time::sleep` between attempts.
pub async fn retry_with_backoff<T, E, Op, Fut>(policy: &RetryPolicy, op: Op) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_with_sleep(policy, op, tokio::time::sleep).await
}

/// Like [`retry_with_backoff`], with the pause supplied by `sleep`.
pub async fn retry_with_sleep<T, E, Op, Fut, S, SFut>(
    policy: &RetryPolicy,
    op: Op,
    sleep: S,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    S: FnMut(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    retry_if_with_sleep(policy, op, |_| true, sleep).await
}

/// Like [`retry_with_backoff`], but an error for which `retryable` returns
/// false is returned at once, without further attempts.
pub async fn retry_if<T, E, Op, Fut, R>(policy: &RetryPolicy, op: Op, retryable: R) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    retry_if_with_sleep(policy, op, retryable, tokio::time::sleep).await
}

/// [`retry_if`] with the pause supplied by `sleep`.
pub async fn retry_if_with_sleep<T, E, Op, Fut, R, S, SFut>(
    policy: &RetryPolicy,
    mut op: Op,
    retryable: R,
    mut sleep: S,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
    S: FnMut(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !retryable(&e) => {
                warn!(
                    "Attempt {}/{} failed: {}. Not retryable",
                    attempt + 1,
                    max_attempts,
                    e
                );
                return Err(e);
            }
            Err(e) if attempt + 1 >= max_attempts => {
                warn!(
                    "Attempt {}/{} failed: {}. No attempts left",
                    attempt + 1,
                    max_attempts,
                    e
                );
                return Err(e);
            }
            Err(e) => {
                let pause = policy.pause_for(attempt);
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:.2}s...",
                    attempt + 1,
                    max_attempts,
                    e,
                    pause.as_secs_f64()
                );
                sleep(pause).await;
                attempt += 1;
            }
        }
    }
}
