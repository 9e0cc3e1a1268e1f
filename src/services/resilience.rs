use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Reusable retry policy: bounded attempts with capped exponential
/// backoff and jitter. Attempts are strictly sequential; the caller's
/// operation is never run concurrently with itself.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound on the random jitter added to each delay. Kept at
    /// most `base_delay / 2` so delays stay non-decreasing across
    /// attempts.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        let base = Duration::from_millis(config.backoff_base_ms);
        Self {
            max_attempts: config.generative_max_attempts,
            base_delay: base,
            max_delay: Duration::from_millis(config.backoff_max_ms),
            jitter: base / 2,
        }
    }

    /// Delay before retrying after a failed attempt (0-based):
    /// base * 2^attempt + jitter, capped at max_delay.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter_ms = if self.jitter.is_zero() {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64)
        };
        (exponential + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

/// Runs `op` until it succeeds, the error stops being retryable, or
/// attempts run out. Sleeps the policy delay between attempts.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&AppError) -> bool,
    mut op: F,
) -> AppResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut last_error = AppError::UpstreamUnavailable("no attempts made".to_string());

    for attempt in 0..policy.max_attempts.max(1) {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempt = attempt + 1, "Retry succeeded");
                }
                return Ok(value);
            }
            Err(e) if is_retryable(&e) => {
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Attempt failed"
                );
                last_error = e;
                if attempt + 1 < policy.max_attempts {
                    tokio::time::sleep(policy.delay(attempt)).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error)
}

/// Result of the fallback ladder: the value plus whether it came from a
/// degraded source.
#[derive(Debug, Clone, PartialEq)]
pub struct Degraded<T> {
    pub value: T,
    pub degraded: bool,
    pub message: Option<String>,
}

impl<T> Degraded<T> {
    pub fn fresh(value: T) -> Self {
        Self {
            value,
            degraded: false,
            message: None,
        }
    }
}

/// Degradation ladder around any call: live result, else last-known-good
/// cache, else a static fallback, else a terminal error.
///
/// Validation errors surface immediately with no fallback. Cache read
/// errors count as an empty cache. An empty live result is a legitimate
/// outcome and never triggers the ladder.
pub async fn with_fallbacks<T, L, C>(
    live: L,
    cached: C,
    fallback: impl FnOnce() -> Option<T>,
) -> AppResult<Degraded<T>>
where
    L: Future<Output = AppResult<T>>,
    C: Future<Output = AppResult<Option<T>>>,
{
    let live_error = match live.await {
        Ok(value) => return Ok(Degraded::fresh(value)),
        Err(e @ AppError::Validation(_)) => return Err(e),
        Err(e) => {
            tracing::warn!(error = %e, "Live pipeline failed, degrading to cache");
            e
        }
    };

    match cached.await {
        Ok(Some(value)) => {
            return Ok(Degraded {
                value,
                degraded: true,
                message: Some("Serving previously computed recommendations".to_string()),
            });
        }
        Ok(None) => tracing::warn!("Cache empty, degrading to static fallback"),
        Err(e) => tracing::warn!(error = %e, "Cache read failed, treating as empty"),
    }

    match fallback() {
        Some(value) => Ok(Degraded {
            value,
            degraded: true,
            message: Some("Serving a default set while the service recovers".to_string()),
        }),
        None => Err(AppError::Terminal(format!(
            "All sources exhausted: {}",
            live_error
        ))),
    }
}
