//! Retry configuration and the shared retry loop.
//!
//! Transient failures (dropped connections, 5xx responses) are retried with
//! exponential backoff: the delay before retry `n` is `initial_delay * 2^n`,
//! so the default configuration waits 1s, then 2s, between its three attempts.
//! Rate-limit waits are handled inside the client and never reach this loop.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

/// Default number of attempts per request (first try included).
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Delay before the first retry.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Upper bound for a single backoff delay.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Configuration for retry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: usize,
    /// Delay before the first retry; doubles for each following retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            with_jitter: false,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(max_attempts: usize, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            with_jitter: false,
        }
    }

    /// Set whether to use jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Number of retries after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> usize {
        self.max_attempts.max(1) - 1
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let retries = self.max_retries();
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the configured attempts are exhausted.
///
/// The operation receives the zero-based attempt number. Before each retry
/// `on_retry` gets the error, the upcoming delay, and the number of attempts
/// made so far, and the retry is logged at debug level. The last error is
/// returned unchanged once attempts run out.
pub async fn with_retry<T, E, F, Fut, IsRetryable, OnRetry>(
    config: &RetryConfig,
    mut operation: F,
    is_retryable: IsRetryable,
    on_retry: OnRetry,
    label: &str,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    IsRetryable: Fn(&E) -> bool,
    OnRetry: Fn(&E, Duration, u32),
{
    let max_attempts = config.max_attempts.max(1);
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        let current = attempt.fetch_add(1, Ordering::SeqCst);
        operation(current)
    };

    retry_op
        .retry(config.clone().into_backoff())
        .when(|e| is_retryable(e))
        .notify(|err, dur| {
            let made = attempt.load(Ordering::SeqCst);
            on_retry(err, dur, made);
            tracing::debug!(
                request = %label,
                attempt = made,
                max_attempts,
                retry_in = ?dur,
                error = %err,
                "Request failed, retrying"
            );
        })
        .await
}
