//! forge::retry
//!
//! Exponential backoff for transient review host failures.
//!
//! Only errors for which [`ForgeError::is_transient`] holds are retried.
//! Defaults: 3 retries with 2s, 4s, 8s delays, capped at 16s. All four
//! numbers are configurable under `[land]` in the global config.
//!
//! Pushes never go through this module; a failed push is reported as-is.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::traits::ForgeError;

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap on the exponential growth.
    pub max_delay: Duration,

    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// 3 retries with 2s, 4s, 8s delays.
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(16),
        backoff_multiplier: 2.0,
    };

    /// No retries at all.
    pub const NONE: Self = Self {
        max_retries: 0,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        backoff_multiplier: 1.0,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Delay before retry `attempt` (0-indexed):
    /// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }

    /// All retry delays in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }

    /// Total time spent sleeping if every retry is used.
    pub fn total_max_wait(&self) -> Duration {
        self.delays().sum()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Whether to retry at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    #[default]
    RetryTransient,
    NoRetry,
}

/// Outcome of [`retry_with_backoff`].
#[derive(Debug)]
pub enum RetryResult<T> {
    Success(T),

    /// Every attempt failed transiently.
    ExhaustedRetries {
        last_error: ForgeError,
        /// Attempts made, including the first.
        attempts: u32,
    },

    /// A non-transient error; not retried.
    PermanentError(ForgeError),
}

impl<T> RetryResult<T> {
    /// Flatten into a `Result`, dropping the attempt count.
    pub fn into_result(self) -> Result<T, ForgeError> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::ExhaustedRetries { last_error, .. } => Err(last_error),
            RetryResult::PermanentError(e) => Err(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of
/// retries, sleeping between transient failures.
pub async fn retry_with_backoff<T, F, Fut>(
    config: RetryConfig,
    policy: RetryPolicy,
    mut operation: F,
) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ForgeError>>,
{
    let mut attempt = 0;
    let max_attempts = match policy {
        RetryPolicy::NoRetry => 1,
        RetryPolicy::RetryTransient => config.max_retries + 1,
    };

    loop {
        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) => {
                attempt += 1;

                if !e.is_transient() {
                    return RetryResult::PermanentError(e);
                }
                if attempt >= max_attempts {
                    return RetryResult::ExhaustedRetries {
                        last_error: e,
                        attempts: attempt,
                    };
                }

                let delay = config.delay_for_attempt(attempt - 1);
                debug!(attempt, ?delay, error = %e, "transient host error, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryConfig {
        RetryConfig::new(3, Duration::from_millis(1), Duration::from_millis(4), 2.0)
    }

    #[test]
    fn default_delays_are_2_4_8() {
        let delays: Vec<_> = RetryConfig::DEFAULT.delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
        assert_eq!(RetryConfig::DEFAULT.total_max_wait(), Duration::from_secs(14));
    }

    #[test]
    fn delays_respect_cap() {
        let config = RetryConfig::new(6, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        let delays: Vec<_> = config.delays().collect();
        assert_eq!(delays[2], Duration::from_secs(4));
        assert_eq!(delays[3], Duration::from_secs(5));
        assert_eq!(delays[5], Duration::from_secs(5));
    }

    #[test]
    fn none_has_no_delays() {
        assert_eq!(RetryConfig::NONE.delays().count(), 0);
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = retry_with_backoff(fast(), RetryPolicy::RetryTransient, move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ForgeError>(42) }
        })
        .await;

        assert!(matches!(result, RetryResult::Success(42)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permanent_error_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = retry_with_backoff(fast(), RetryPolicy::RetryTransient, move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(ForgeError::MergeRejected("conflict".into())) }
        })
        .await;

        assert!(matches!(result, RetryResult::PermanentError(_)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_succeeds_on_third_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = retry_with_backoff(fast(), RetryPolicy::RetryTransient, move || {
            let count = c.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(ForgeError::NetworkError("reset".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert!(result.is_success());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transient_exhausts_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = retry_with_backoff(fast(), RetryPolicy::RetryTransient, move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(ForgeError::Timeout("30s".into())) }
        })
        .await;

        match result {
            RetryResult::ExhaustedRetries { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("expected ExhaustedRetries, got {other:?}"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn no_retry_policy_makes_one_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = retry_with_backoff(fast(), RetryPolicy::NoRetry, move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(ForgeError::RateLimited) }
        })
        .await;

        assert!(matches!(
            result,
            RetryResult::ExhaustedRetries { attempts: 1, .. }
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn delays_never_exceed_cap(
            retries in 0u32..12,
            initial_ms in 1u64..1000,
            cap_ms in 1u64..10_000,
        ) {
            let config = RetryConfig::new(
                retries,
                Duration::from_millis(initial_ms),
                Duration::from_millis(cap_ms),
                2.0,
            );
            for delay in config.delays() {
                prop_assert!(delay <= Duration::from_millis(cap_ms));
            }
            prop_assert_eq!(config.delays().count() as u32, retries);
        }

        #[test]
        fn delays_are_non_decreasing(retries in 1u32..12, initial_ms in 1u64..500) {
            let config = RetryConfig::new(
                retries,
                Duration::from_millis(initial_ms),
                Duration::from_secs(60),
                2.0,
            );
            let delays: Vec<_> = config.delays().collect();
            for pair in delays.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
        }
    }
}
