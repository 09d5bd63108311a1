//! Bounded retry with a fixed delay
//!
//! Extraction is retried up to a configured number of attempts with a constant
//! pause between them. Errors are classified through [`IsRetryable`]; a
//! non-retryable error ends the loop immediately.
//!
//! # Example
//!
//! ```no_run
//! use split_ingest::retry::{IsRetryable, RetryPolicy, retry_fixed};
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! struct Flaky;
//!
//! impl std::fmt::Display for Flaky {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         f.write_str("flaky")
//!     }
//! }
//!
//! impl IsRetryable for Flaky {
//!     fn is_retryable(&self) -> bool {
//!         true
//!     }
//! }
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(3, Duration::from_secs(1));
//! let result = retry_fixed(&policy, |attempt| async move {
//!     if attempt < 2 { Err(Flaky) } else { Ok(attempt) }
//! })
//! .await;
//! assert_eq!(result.unwrap(), 2);
//! # }
//! ```

use crate::config::Config;
use crate::error::{Error, PipelineError};
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if another attempt may succeed
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Non-fatal conditions reported by the tool itself: rerun it
            Error::Pipeline(PipelineError::ToolExit { .. })
            | Error::Pipeline(PipelineError::NothingExtracted { .. }) => true,
            // Spawn failures other than a missing binary (EAGAIN, EMFILE, ...)
            Error::ExternalTool(_) => true,
            // Transient filesystem hiccups while preparing or scanning the output
            Error::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ),
            // The binary is missing or not executable: retrying cannot help
            Error::NotSupported(_) => false,
            Error::Pipeline(_) => false,
            Error::Config { .. } => false,
            Error::FolderWatch(_) => false,
            Error::Serialization(_) => false,
            Error::Other(_) => false,
        }
    }
}

/// Attempt bound and inter-attempt delay
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` is clamped to at least 1
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl From<&Config> for RetryPolicy {
    fn from(config: &Config) -> Self {
        Self::new(config.max_retries, config.retry_delay)
    }
}

/// Returned when every attempt failed or a non-retryable error occurred
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Attempts actually made
    pub attempts: u32,
    /// Error from the last attempt
    pub error: E,
}

/// Run `operation` until it succeeds, returns a non-retryable error, or
/// `policy.max_attempts` attempts have been made
///
/// `operation` receives the 1-based attempt number. Once an attempt succeeds no
/// further attempts are made.
pub async fn retry_fixed<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(attempts = attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = policy.delay.as_millis() as u64,
                    "attempt {}/{} failed, retrying",
                    attempt,
                    policy.max_attempts
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::debug!(error = %e, attempts = attempt, "retry attempts exhausted");
                } else {
                    tracing::debug!(error = %e, attempts = attempt, "non-retryable error");
                }
                return Err(RetryExhausted { attempts: attempt, error: e });
            }
        }
    }
}
