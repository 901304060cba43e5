//! Retry Wrapper
//!
//! Re-invokes a remote call while it fails with a transient error.
//!
//! ## Policies
//!
//! - **Fixed**: up to `max_attempts` calls, constant wait between them.
//!   Used for single-document reads/writes/deletes and bulk flushes.
//! - **Exponential**: wait `multiplier * 2^(n-1)` after the n-th failure,
//!   capped at `max_wait`. Attempts are unbounded unless `max_attempts` is
//!   set. Used for structural operations (index/mapping management, count).
//!
//! Non-transient errors (not found, conflicts, rejections) are returned on
//! the first occurrence. When attempts are exhausted the last error is
//! returned unchanged.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How a failing call is retried
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    Fixed {
        /// Total number of calls, including the first one
        max_attempts: u32,
        #[serde(with = "crate::config::duration_millis")]
        wait: Duration,
    },
    Exponential {
        #[serde(with = "crate::config::duration_millis")]
        multiplier: Duration,
        #[serde(with = "crate::config::duration_millis")]
        max_wait: Duration,
        /// `None` retries until success
        #[serde(default)]
        max_attempts: Option<u32>,
    },
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, wait: Duration) -> Self {
        RetryPolicy::Fixed { max_attempts, wait }
    }

    pub fn exponential(multiplier: Duration, max_wait: Duration) -> Self {
        RetryPolicy::Exponential {
            multiplier,
            max_wait,
            max_attempts: None,
        }
    }

    /// Single-document operations: 5 attempts, 3s apart
    pub fn document_default() -> Self {
        Self::fixed(5, Duration::from_secs(3))
    }

    /// Structural operations: 4s doubling up to 60s, unbounded
    pub fn structural_default() -> Self {
        Self::exponential(Duration::from_secs(4), Duration::from_secs(60))
    }

    /// Bulk flushes: 5 attempts, 60s apart
    pub fn bulk_default() -> Self {
        Self::fixed(5, Duration::from_secs(60))
    }

    /// Bound the number of attempts of an exponential policy
    pub fn with_max_attempts(self, attempts: u32) -> Self {
        match self {
            RetryPolicy::Fixed { wait, .. } => RetryPolicy::Fixed {
                max_attempts: attempts,
                wait,
            },
            RetryPolicy::Exponential {
                multiplier,
                max_wait,
                ..
            } => RetryPolicy::Exponential {
                multiplier,
                max_wait,
                max_attempts: Some(attempts),
            },
        }
    }

    /// Wait after the `failures`-th consecutive failure (1-based)
    pub fn delay_for(&self, failures: u32) -> Duration {
        match self {
            RetryPolicy::Fixed { wait, .. } => *wait,
            RetryPolicy::Exponential {
                multiplier,
                max_wait,
                ..
            } => {
                let exponent = failures.saturating_sub(1).min(31);
                let factor = 1u32 << exponent;
                multiplier
                    .checked_mul(factor)
                    .unwrap_or(*max_wait)
                    .min(*max_wait)
            }
        }
    }

    /// Whether another call is allowed after `attempts` calls have failed
    pub fn allows_another(&self, attempts: u32) -> bool {
        match self {
            RetryPolicy::Fixed { max_attempts, .. } => attempts < *max_attempts,
            RetryPolicy::Exponential { max_attempts, .. } => {
                max_attempts.map(|max| attempts < max).unwrap_or(true)
            }
        }
    }
}

/// Run `call` until it succeeds, fails permanently, or the policy gives up
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempts: u32 = 0;
    loop {
        attempts = attempts.saturating_add(1);
        match call().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(operation, attempts, "call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                if !policy.allows_another(attempts) {
                    error!(operation, attempts, error = %e, "giving up after retries");
                    return Err(e);
                }
                let delay = policy.delay_for(attempts);
                warn!(
                    operation,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient store failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
