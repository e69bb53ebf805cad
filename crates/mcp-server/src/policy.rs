//! Execution policy: deadline plus bounded retry around any fallible
//! async operation.
//!
//! The policy is intentionally unconditional: it never inspects the
//! error. Whether a failure is worth deferring to the recovery queue
//! is decided by the caller after the policy gives up.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, ServerError};

#[derive(Debug, Clone, Copy)]
pub struct ExecutionPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            max_retries: 2,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Per-call adjustments layered over a base policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyOverride {
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub base_delay: Option<Duration>,
    pub max_delay: Option<Duration>,
}

impl ExecutionPolicy {
    /// This policy with any override fields applied on top.
    pub fn merged(&self, over: &PolicyOverride) -> ExecutionPolicy {
        ExecutionPolicy {
            timeout: over.timeout.unwrap_or(self.timeout),
            max_retries: over.max_retries.unwrap_or(self.max_retries),
            base_delay: over.base_delay.unwrap_or(self.base_delay),
            max_delay: over.max_delay.unwrap_or(self.max_delay),
        }
    }

    /// Run `op` under this policy.
    ///
    /// On error the operation is retried after
    /// `min(base_delay * 2^(attempt-1), max_delay)` until `max_retries`
    /// is exhausted, so an operation that never succeeds is invoked
    /// exactly `max_retries + 1` times. The deadline spans all attempts;
    /// expiry aborts with `TIMEOUT_ERROR`. Success values pass through
    /// untouched.
    pub async fn run<T, F, Fut, R>(&self, mut op: F, mut on_retry: R) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        R: FnMut(u32, &ServerError),
    {
        let attempts = async {
            let mut attempt = 0u32;
            loop {
                match op().await {
                    Ok(value) => return Ok(value),
                    Err(err) => {
                        if attempt >= self.max_retries {
                            return Err(err);
                        }
                        attempt += 1;
                        on_retry(attempt, &err);
                        let delay = self
                            .base_delay
                            .saturating_mul(2u32.saturating_pow(attempt - 1))
                            .min(self.max_delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        };

        match tokio::time::timeout(self.timeout, attempts).await {
            Ok(result) => result,
            Err(_) => Err(ServerError::timeout(format!(
                "operation exceeded {}ms deadline",
                self.timeout.as_millis()
            ))),
        }
    }
}
