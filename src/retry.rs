//! Retry logic with bounded backoff
//!
//! This module provides configurable retry logic for transient failures. The default
//! schedule is linear (`attempt × base_interval`), matching how the backend behaves while
//! it is still assembling artifacts; exponential growth and jitter are opt-in.
//!
//! # Example
//!
//! ```no_run
//! use bookgen_client::retry::{IsRetryable, download_with_retry};
//! use bookgen_client::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = download_with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{Backoff, RetryConfig};
use crate::error::{DownloadError, Error};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (server still processing) should return `true`.
/// Permanent failures (not found, forbidden, empty artifact) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

/// Implementation of IsRetryable for our Error type
///
/// Only statuses the retry policy marked as transient are retried; transport failures
/// are terminal so the caller sees them immediately.
impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Download(e) => e.is_retryable(),
            Error::Network(_) => false,
            Error::Api(_) => false,
            Error::Config { .. } => false,
            Error::Translation(_) => false,
            Error::AlignmentViolation { .. } => false,
            Error::InvalidInput(_) => false,
            Error::JobNotReady(_) => false,
            Error::Serialization(_) => false,
            Error::Url(_) => false,
            Error::SaveFailed { .. } => false,
        }
    }
}

impl IsRetryable for DownloadError {
    fn is_retryable(&self) -> bool {
        matches!(self, DownloadError::TransientStatus { .. })
    }
}

/// Outcome of one attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The operation succeeded
    Success,
    /// Retryable failure; another attempt follows
    TransientFailure,
    /// Terminal failure, or a retryable one with no retries left
    FatalFailure,
}

/// Record of one attempt, reported to the observer of [`download_with_retry_observed`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based attempt number
    pub number: u32,
    /// What happened
    pub outcome: AttemptOutcome,
    /// Delay waited before the next attempt, if one follows
    pub delay: Option<Duration>,
}

/// Delay before retry number `retry` (1-based), before jitter
///
/// ```
/// use bookgen_client::config::RetryConfig;
/// use bookgen_client::retry::backoff_delay;
/// use std::time::Duration;
///
/// let config = RetryConfig::default();
/// assert_eq!(backoff_delay(&config, 1), Duration::from_secs(2));
/// assert_eq!(backoff_delay(&config, 2), Duration::from_secs(4));
/// assert_eq!(backoff_delay(&config, 3), Duration::from_secs(6));
/// ```
pub fn backoff_delay(config: &RetryConfig, retry: u32) -> Duration {
    let base = config.base_interval;
    let delay = match config.backoff {
        Backoff::Linear => base.saturating_mul(retry),
        Backoff::Exponential { multiplier } => {
            // a multiplier below 1.0 (or NaN) would shrink or negate the delay
            let multiplier = multiplier.max(1.0);
            let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
            let secs = base.as_secs_f64() * multiplier.powi(exponent);
            if secs.is_finite() {
                Duration::from_secs_f64(secs.clamp(0.0, config.max_delay.as_secs_f64()))
            } else {
                config.max_delay
            }
        }
    };
    delay.min(config.max_delay)
}

/// Execute an async operation with bounded retry
///
/// # Arguments
///
/// * `config` - Retry configuration (retry cap, delays, backoff shape, jitter)
/// * `operation` - Async closure that returns Result<T, E> where E implements IsRetryable
///
/// # Returns
///
/// Returns the successful result or the last error after all retry attempts are exhausted.
/// Attempts are strictly sequential: the next one starts only after the previous outcome
/// and its delay are known.
pub async fn download_with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    download_with_retry_observed(config, operation, |_| {}).await
}

/// [`download_with_retry`], reporting every attempt to `observer`
pub async fn download_with_retry_observed<F, Fut, T, E, O>(
    config: &RetryConfig,
    mut operation: F,
    mut observer: O,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
    O: FnMut(&Attempt),
{
    let mut retries = 0;

    loop {
        let number = retries + 1;
        match operation().await {
            Ok(result) => {
                if retries > 0 {
                    tracing::info!(attempts = number, "Operation succeeded after retry");
                }
                observer(&Attempt {
                    number,
                    outcome: AttemptOutcome::Success,
                    delay: None,
                });
                return Ok(result);
            }
            Err(e) if e.is_retryable() && retries < config.max_retries => {
                retries += 1;
                let delay = backoff_delay(config, retries);
                let delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tracing::warn!(
                    error = %e,
                    attempt = number,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );
                observer(&Attempt {
                    number,
                    outcome: AttemptOutcome::TransientFailure,
                    delay: Some(delay),
                });

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = number,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                observer(&Attempt {
                    number,
                    outcome: AttemptOutcome::FatalFailure,
                    delay: None,
                });
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
