//! Bounded retry around whole backup and restore operations

use crate::error::{Error, ErrorCategory, ErrorSeverity, Result};
use std::time::Duration;

/// How often and how patiently to retry a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure
    pub max_retries: u32,
    /// Delay before retry `n` is `base_delay * n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Run once, never retry
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Only recoverable, non-critical filesystem errors are worth another try
    pub fn is_retryable(error: &Error) -> bool {
        error.category() == ErrorCategory::FileSystem
            && error.is_recoverable()
            && error.severity() != ErrorSeverity::Critical
    }

    /// Run `op`, retrying retryable failures with an increasing delay
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0u32;

        loop {
            match op() {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!("{} succeeded after {} retries", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_interrupted() => return Err(e),
                Err(e) => {
                    let context = e
                        .context()
                        .into_iter()
                        .map(|(k, v)| format!("{}={}", k, v))
                        .collect::<Vec<_>>()
                        .join(" ");
                    tracing::error!(
                        category = %e.category(),
                        severity = %e.severity(),
                        context = %context,
                        "{} failed: {}",
                        operation,
                        e
                    );

                    if attempt >= self.max_retries || !Self::is_retryable(&e) {
                        return Err(e);
                    }

                    attempt += 1;
                    let delay = self.base_delay * attempt;
                    tracing::warn!(
                        "Retrying {} (attempt {}/{}) in {:?}",
                        operation,
                        attempt,
                        self.max_retries,
                        delay
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }
}
