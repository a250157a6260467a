//! Async utilities and patterns
//!
//! Retry with exponential backoff and timeout wrapping for outbound calls.

use crate::error::{DelveError, DelveResult, ErrorContext};
use std::future::Future;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Backoff multiplier (exponential backoff)
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// Only errors for which [`DelveError::is_recoverable`] holds are retried.
pub async fn retry_async<F, Fut, T>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> DelveResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DelveResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let mut delay = config.initial_delay_ms;

    loop {
        attempt += 1;
        debug!(
            operation = operation_name,
            attempt, max_attempts, "Attempting operation"
        );

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) if attempt >= max_attempts || !err.is_recoverable() => {
                error!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    "Operation failed, giving up"
                );
                return Err(err);
            }
            Err(err) => {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    delay_ms = delay,
                    "Operation failed, retrying"
                );

                let actual_delay = if config.jitter {
                    let jitter = (fastrand::f64() - 0.5) * 0.2;
                    ((delay as f64) * (1.0 + jitter)) as u64
                } else {
                    delay
                };
                sleep(Duration::from_millis(actual_delay)).await;

                delay = (((delay as f64) * config.backoff_multiplier) as u64).min(config.max_delay_ms);
            }
        }
    }
}

/// Timeout wrapper for async operations
pub async fn with_timeout<F, T>(future: F, timeout_ms: u64, operation_name: &str) -> DelveResult<T>
where
    F: Future<Output = T>,
{
    match timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(DelveError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: timeout_ms,
            context: ErrorContext::new("async_utils")
                .with_operation("timeout")
                .with_metadata("timeout_ms", &timeout_ms.to_string())
                .with_suggestion("Increase the timeout in the configuration file"),
        }),
    }
}
