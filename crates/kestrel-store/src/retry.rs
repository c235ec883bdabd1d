//! Bounded retry with a fixed interval.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{Result, StoreError};

/// How often, and how patiently, to retry a failing store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retriable error, or the
    /// attempt budget is spent.
    ///
    /// # Errors
    ///
    /// Returns the first non-retriable error unchanged, or
    /// `StoreError::RetriesExhausted` wrapping the last error.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retriable() => return Err(e),
                Err(e) if attempt >= attempts => {
                    return Err(StoreError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Store operation failed, retrying"
                    );
                    tokio::time::sleep(self.interval).await;
                }
            }
        }
    }
}
