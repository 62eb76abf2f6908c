//! Retry logic with exponential backoff
//!
//! This module wraps platform operations with error-classified retries:
//! permanent errors return immediately, rate limits honor the server's
//! wait hint, and everything else backs off exponentially.

use crate::core::error::{PlatformError, PlatformResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Options for retry behavior
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Maximum number of attempts, including the first (minimum 1)
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further attempt
    pub base_delay: Duration,
    /// Upper bound for exponential backoff delays
    pub max_delay: Duration,
    /// Wait applied to rate-limit errors that carry no retry-after hint
    pub rate_limit_fallback: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            rate_limit_fallback: Duration::from_secs(60),
        }
    }
}

/// Value (or final error) of a retried operation plus the attempts it took
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: PlatformResult<T>,
    pub attempts: u32,
}

/// Executor for running platform operations with retries
///
/// # Examples
///
/// ```no_run
/// use platform_publisher::core::{PlatformError, RetryExecutor, RetryOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), PlatformError> {
///     let executor = RetryExecutor::new(RetryOptions::default());
///
///     let id = executor
///         .execute("blog", || async { Ok::<_, PlatformError>("post-42") })
///         .await?;
///
///     assert_eq!(id, "post-42");
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    options: RetryOptions,
}

impl RetryExecutor {
    /// Create a new RetryExecutor; `max_retries` is raised to at least 1
    pub fn new(mut options: RetryOptions) -> Self {
        options.max_retries = options.max_retries.max(1);
        Self { options }
    }

    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Execute the operation, returning its value or the final error
    ///
    /// Non-retryable errors are returned as-is after the first attempt. When
    /// every attempt fails with retryable errors the last one is wrapped in
    /// [`PlatformError::RetriesExhausted`].
    pub async fn execute<F, Fut, T>(&self, platform: &str, operation: F) -> PlatformResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PlatformResult<T>>,
    {
        self.execute_counted(platform, operation).await.result
    }

    /// Same as [`execute`](Self::execute) but also reports the attempt count
    pub async fn execute_counted<F, Fut, T>(&self, platform: &str, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PlatformResult<T>>,
    {
        let max_attempts = self.options.max_retries;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(platform, attempt, "operation succeeded after retry");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                debug!(platform, attempt, code = error.code(), "non-retryable error");
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                };
            }

            if attempt >= max_attempts {
                return RetryOutcome {
                    result: Err(PlatformError::RetriesExhausted {
                        platform: platform.to_string(),
                        attempts: attempt,
                        source: Box::new(error),
                    }),
                    attempts: attempt,
                };
            }

            let delay = self.delay_for(&error, attempt);
            warn!(
                platform,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying platform operation"
            );
            sleep(delay).await;
        }
    }

    /// Wait before the attempt following `attempt` (1-based)
    ///
    /// Rate-limit waits follow the server hint and are not capped.
    pub fn delay_for(&self, error: &PlatformError, attempt: u32) -> Duration {
        if let PlatformError::RateLimited { retry_after, .. } = error {
            return retry_after.unwrap_or(self.options.rate_limit_fallback);
        }

        let exponent = attempt.saturating_sub(1).min(31);
        self.options
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.options.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::ValidationError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn fast_options() -> RetryOptions {
        RetryOptions {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            rate_limit_fallback: Duration::from_millis(10),
        }
    }

    fn network_error() -> PlatformError {
        PlatformError::Network {
            platform: "blog".to_string(),
            message: "ECONNREFUSED".to_string(),
        }
    }

    #[tokio::test]
    async fn test_retry_success_on_first_attempt() {
        let executor = RetryExecutor::new(RetryOptions::default());

        let outcome = executor
            .execute_counted("blog", || async { Ok::<_, PlatformError>(42) })
            .await;

        assert_eq!(outcome.result.unwrap(), 42);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let executor = RetryExecutor::new(fast_options());

        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let outcome = executor
            .execute_counted("blog", move || {
                let count = counter_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err(network_error())
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), "success");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_wraps_last_error() {
        let executor = RetryExecutor::new(fast_options());

        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = executor
            .execute("blog", move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async move { Err::<i32, _>(network_error()) }
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        match result {
            Err(PlatformError::RetriesExhausted {
                attempts, source, ..
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(source.code(), "NETWORK_ERROR");
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_content_validation_is_attempted_once() {
        let executor = RetryExecutor::new(fast_options());

        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = executor
            .execute("blog", move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err::<i32, _>(PlatformError::ContentValidation {
                        platform: "blog".to_string(),
                        errors: vec![ValidationError::new("title", "Title is required")],
                    })
                }
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().code(), "CONTENT_VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn test_unexpected_response_is_attempted_once() {
        let executor = RetryExecutor::new(fast_options());

        let outcome = executor
            .execute_counted("blog", || async {
                Err::<i32, _>(PlatformError::UnexpectedResponse {
                    platform: "blog".to_string(),
                    message: "response did not include a post id".to_string(),
                })
            })
            .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result.unwrap_err().code(), "UNEXPECTED_RESPONSE");
    }

    #[tokio::test]
    async fn test_authentication_error_is_not_retried() {
        let executor = RetryExecutor::new(fast_options());

        let outcome = executor
            .execute_counted("blog", || async {
                Err::<i32, _>(PlatformError::Authentication {
                    platform: "blog".to_string(),
                    message: "401".to_string(),
                })
            })
            .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result.unwrap_err().code(), "AUTHENTICATION_FAILED");
    }

    #[tokio::test]
    async fn test_rate_limit_waits_for_retry_after() {
        let executor = RetryExecutor::new(fast_options());

        let attempts_at = Arc::new(std::sync::Mutex::new(Vec::new()));
        let attempts_clone = attempts_at.clone();

        let result = executor
            .execute("webhook", move || {
                let mut times = attempts_clone.lock().unwrap();
                times.push(Instant::now());
                let first = times.len() == 1;
                async move {
                    if first {
                        Err(PlatformError::RateLimited {
                            platform: "webhook".to_string(),
                            retry_after: Some(Duration::from_secs(2)),
                        })
                    } else {
                        Ok("published")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "published");
        let times = attempts_at.lock().unwrap();
        assert_eq!(times.len(), 2);
        let gap = times[1].duration_since(times[0]);
        assert!(gap >= Duration::from_secs(2), "expected >= 2s, got {:?}", gap);
    }

    #[tokio::test]
    async fn test_exponential_backoff() {
        let executor = RetryExecutor::new(RetryOptions {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            rate_limit_fallback: Duration::from_secs(60),
        });

        let start = Instant::now();

        let _result = executor
            .execute("blog", || async { Err::<i32, _>(network_error()) })
            .await;

        let elapsed = start.elapsed();

        // 10ms + 20ms, no wait after the last attempt
        assert!(
            elapsed >= Duration::from_millis(30),
            "Expected at least 30ms, got {:?}",
            elapsed
        );
    }

    #[test]
    fn test_delay_for_caps_backoff() {
        let executor = RetryExecutor::new(RetryOptions {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            rate_limit_fallback: Duration::from_secs(60),
        });
        let error = network_error();

        assert_eq!(executor.delay_for(&error, 1), Duration::from_millis(100));
        assert_eq!(executor.delay_for(&error, 2), Duration::from_millis(200));
        assert_eq!(executor.delay_for(&error, 3), Duration::from_millis(250));
        assert_eq!(executor.delay_for(&error, 40), Duration::from_millis(250));
    }

    #[test]
    fn test_delay_for_rate_limit_fallback() {
        let executor = RetryExecutor::new(RetryOptions::default());
        let error = PlatformError::RateLimited {
            platform: "blog".to_string(),
            retry_after: None,
        };

        assert_eq!(executor.delay_for(&error, 1), Duration::from_secs(60));
    }

    #[test]
    fn test_retry_options_default() {
        let options = RetryOptions::default();

        assert_eq!(options.max_retries, 3);
        assert_eq!(options.base_delay, Duration::from_secs(1));
        assert_eq!(options.max_delay, Duration::from_secs(300));
        assert_eq!(options.rate_limit_fallback, Duration::from_secs(60));
    }

    #[test]
    fn test_zero_max_retries_is_raised_to_one() {
        let executor = RetryExecutor::new(RetryOptions {
            max_retries: 0,
            ..RetryOptions::default()
        });

        assert_eq!(executor.options().max_retries, 1);
    }
}
