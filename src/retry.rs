//! Retry logic with exponential backoff
//!
//! Rate-limited and transient failures share one backoff policy: the delay
//! before retry `n` is `initial_delay * multiplier^(n-1)`, capped at
//! `max_delay`, optionally jittered. `max_attempts` counts every attempt,
//! including the first.
//!
//! # Example
//!
//! ```no_run
//! use vocab_fetch::retry::fetch_with_retry;
//! use vocab_fetch::config::RetryConfig;
//! use vocab_fetch::error::FetchError;
//!
//! # async fn example() -> Result<(), FetchError> {
//! let config = RetryConfig::default();
//! let (body, attempts) = fetch_with_retry(&config, "apple", |_attempt| async {
//!     Ok::<_, FetchError>("{}".to_string())
//! })
//! .await?;
//! # let _ = (body, attempts);
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::TransientNetwork(_)
            | FetchError::RateLimited { .. }
            | FetchError::HttpStatus { .. }
            | FetchError::MalformedResponse(_) => true,
            // Already terminal
            FetchError::RetriesExhausted { .. } => false,
        }
    }
}

/// Delay before the retry that follows failed attempt `attempt` (1-based), without jitter
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    if !secs.is_finite() || secs >= config.max_delay.as_secs_f64() {
        config.max_delay
    } else {
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Run `operation` until it succeeds or `max_attempts` is reached
///
/// The closure receives the 1-based attempt number. On success the value is
/// returned together with the number of attempts it took. When every attempt
/// fails, or an error is not retryable, the result is
/// [`FetchError::RetriesExhausted`] carrying the last error.
pub async fn fetch_with_retry<F, Fut, T>(
    config: &RetryConfig,
    key: &str,
    mut operation: F,
) -> Result<(T, u32), FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(key, attempts = attempt, "fetch succeeded after retry");
                }
                return Ok((value, attempt));
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = backoff_delay(config, attempt);
                let delay = if config.jitter { add_jitter(delay) } else { delay };

                if e.is_rate_limited() {
                    tracing::warn!(
                        key,
                        error = %e,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                } else {
                    tracing::warn!(
                        key,
                        error = %e,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "fetch failed, retrying"
                    );
                }

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(key, error = %e, attempts = attempt, "giving up on fetch");
                return Err(match e {
                    exhausted @ FetchError::RetriesExhausted { .. } => exhausted,
                    other => FetchError::RetriesExhausted {
                        key: key.to_string(),
                        attempts: attempt,
                        last_error: other.to_string(),
                    },
                });
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt_reports_one_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let (value, attempts) = fetch_with_retry(&fast_config(3), "apple", |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, FetchError>(42)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "should only call once");
    }

    #[tokio::test]
    async fn transient_failures_then_success_is_plain_success() {
        let (value, attempts) = fetch_with_retry(&fast_config(3), "apple", |attempt| async move {
            if attempt < 3 {
                Err(FetchError::TransientNetwork("connection reset".into()))
            } else {
                Ok("body")
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "body");
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn max_attempts_counts_the_first_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let err = fetch_with_retry(&fast_config(3), "apple", |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FetchError::RateLimited { status: 429 })
            }
        })
        .await
        .unwrap_err();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        match err {
            FetchError::RetriesExhausted {
                key,
                attempts,
                last_error,
            } => {
                assert_eq!(key, "apple");
                assert_eq!(attempts, 3);
                assert!(last_error.contains("429"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn single_attempt_config_never_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = fetch_with_retry(&fast_config(1), "apple", |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FetchError::HttpStatus { status: 500 })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let config = RetryConfig {
            max_attempts: 6,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(&config, 4), Duration::from_millis(500));
        assert_eq!(backoff_delay(&config, 60), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn exponential_backoff_waits_between_attempts() {
        let start = std::time::Instant::now();

        let _ = fetch_with_retry(&fast_config(3), "apple", |_| async {
            Err::<(), _>(FetchError::MalformedResponse("eof".into()))
        })
        .await;

        // 10ms + 20ms between three attempts
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(30),
            "should wait at least 30ms, waited {elapsed:?}"
        );
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn jitter_stays_within_one_extra_delay() {
        let delay = Duration::from_millis(100);
        for _ in 0..20 {
            let jittered = add_jitter(delay);
            assert!(jittered >= delay);
            assert!(jittered <= delay * 2);
        }
    }

    #[test]
    fn exhausted_is_not_retryable() {
        let err = FetchError::RetriesExhausted {
            key: "k".into(),
            attempts: 3,
            last_error: "x".into(),
        };
        assert!(!err.is_retryable());
        assert!(FetchError::HttpStatus { status: 404 }.is_retryable());
    }
}
