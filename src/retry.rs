//! Bounded retry with escalating delay
//!
//! Shared by the upload and download paths. An operation is invoked up to
//! `max_attempts` times; the delay between attempts starts at
//! `initial_delay` and is multiplied by `backoff_multiplier` after each
//! failure, capped at `max_delay`, with optional jitter. Attempts are
//! strictly sequential. Exhausting the bound yields
//! [`Error::RetriesExhausted`] naming the operation and the attempts spent.

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network errors, remote rejections, integrity
/// mismatches that a fresh attempt may fix) return `true`. Permanent
/// failures (bad configuration, unreadable source files, local resource
/// problems) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Transport failures, including malformed responses
            Error::Network(_) | Error::Serialization(_) => true,
            // Application-level rejection: the remote answered but said no
            Error::Status { .. } | Error::Rejected { .. } => true,
            // A fresh attempt re-downloads everything and may assemble cleanly
            Error::Integrity(_) => true,
            // Precondition and resource problems need operator action
            Error::Config { .. }
            | Error::SourceFile { .. }
            | Error::Io(_)
            | Error::NotFound(_)
            | Error::FolderWatch(_)
            | Error::Server(_) => false,
            // Already terminal
            Error::RetriesExhausted { .. } => false,
        }
    }
}

/// Execute an async operation under the bounded retry policy.
///
/// Returns the first success immediately. A non-retryable error is returned
/// as-is without consuming further attempts. When every attempt fails with a
/// retryable error, returns [`Error::RetriesExhausted`] carrying the last
/// cause.
///
/// # Arguments
///
/// * `config` - retry bound and delay schedule
/// * `operation` - label used in logs and the terminal error
/// * `f` - async closure invoked once per attempt
pub async fn run_with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation: &str,
    mut f: F,
) -> crate::error::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::error::Result<T>>,
{
    let mut delay = config.initial_delay;
    let mut last_error: Option<Error> = None;

    for attempt in 1..=config.max_attempts {
        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if !e.is_retryable() => {
                tracing::error!(operation, error = %e, "operation failed with non-retryable error");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = config.max_attempts,
                    error = %e,
                    "attempt failed"
                );
                last_error = Some(e);

                if attempt < config.max_attempts {
                    let sleep_for = if config.jitter { add_jitter(delay) } else { delay };
                    tokio::time::sleep(sleep_for).await;
                    delay = Duration::from_secs_f64(
                        delay.as_secs_f64() * config.backoff_multiplier,
                    )
                    .min(config.max_delay);
                }
            }
        }
    }

    let last = last_error.unwrap_or(Error::Config {
        message: format!("{operation} was configured with max_attempts = 0"),
        key: Some("max_attempts".to_string()),
    });
    tracing::error!(
        operation,
        attempts = config.max_attempts,
        error = %last,
        "all retry attempts exhausted"
    );
    Err(Error::RetriesExhausted {
        operation: operation.to_string(),
        attempts: config.max_attempts,
        last: Box::new(last),
    })
}

/// Add random jitter to a delay: uniformly between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
