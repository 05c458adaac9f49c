//! Retry policies
//!
//! TigerStyle: Bounded retries by default, unbounded only when asked for.
//!
//! Two shapes are recognized:
//! - **Exponential backoff** (bounded): used by registration so that a
//!   producer fails fast when the ensemble is unreachable.
//! - **Forever** (fixed interval): used by short-lived discovery sessions,
//!   which keep retrying silently and rely on the status probe or the
//!   caller's cancellation to stop.

use crate::error::{CoordError, CoordResult};
use beacon_core::constants::{
    DISCOVERY_RETRY_INTERVAL_MS, REGISTRATION_RETRY_BASE_SLEEP_MS, REGISTRATION_RETRY_COUNT_MAX,
    RETRY_SLEEP_MS_MAX,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Largest exponent used when computing backoff (keeps the shift in range)
const BACKOFF_EXPONENT_MAX: u32 = 29;

/// Retry policy for session establishment and operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Bounded exponential backoff with jitter
    ExponentialBackoff {
        /// Initial sleep in milliseconds
        base_sleep_ms: u64,
        /// Retries after the first attempt
        max_retries: u32,
        /// Cap on a single sleep in milliseconds
        max_sleep_ms: u64,
    },
    /// Retry forever at a fixed interval
    Forever {
        /// Sleep between attempts in milliseconds
        interval_ms: u64,
    },
}

impl RetryPolicy {
    /// Bounded exponential backoff
    pub fn exponential_backoff(base_sleep_ms: u64, max_retries: u32) -> Self {
        Self::ExponentialBackoff {
            base_sleep_ms,
            max_retries,
            max_sleep_ms: RETRY_SLEEP_MS_MAX.max(base_sleep_ms),
        }
    }

    /// Retry forever at a fixed interval
    pub fn forever(interval_ms: u64) -> Self {
        Self::Forever { interval_ms }
    }

    /// Policy used by registration sessions (1 s base, 3 retries)
    pub fn registration() -> Self {
        Self::exponential_backoff(REGISTRATION_RETRY_BASE_SLEEP_MS, REGISTRATION_RETRY_COUNT_MAX)
    }

    /// Policy used by discovery sessions (retry forever)
    pub fn discovery() -> Self {
        Self::forever(DISCOVERY_RETRY_INTERVAL_MS)
    }

    /// Check the policy can drive a retry loop
    ///
    /// # Errors
    /// `InvalidOptions` for a zero sleep or a cap below the base sleep.
    pub fn validate(&self) -> CoordResult<()> {
        match self {
            Self::ExponentialBackoff {
                base_sleep_ms,
                max_sleep_ms,
                ..
            } => {
                if *base_sleep_ms == 0 {
                    return Err(CoordError::invalid_options(
                        "base_sleep_ms",
                        "must be positive",
                    ));
                }
                if max_sleep_ms < base_sleep_ms {
                    return Err(CoordError::invalid_options(
                        "max_sleep_ms",
                        format!("{} is below base sleep {}", max_sleep_ms, base_sleep_ms),
                    ));
                }
            }
            Self::Forever { interval_ms } => {
                if *interval_ms == 0 {
                    return Err(CoordError::invalid_options("interval_ms", "must be positive"));
                }
            }
        }
        Ok(())
    }

    /// Whether the policy eventually gives up
    pub fn is_bounded(&self) -> bool {
        matches!(self, Self::ExponentialBackoff { .. })
    }

    /// Maximum attempts (first try included); `None` when unbounded
    pub fn attempts_max(&self) -> Option<u32> {
        match self {
            Self::ExponentialBackoff { max_retries, .. } => Some(max_retries.saturating_add(1)),
            Self::Forever { .. } => None,
        }
    }

    /// Whether retry number `retry_count` (0-based) is allowed
    pub fn allows_retry(&self, retry_count: u32) -> bool {
        match self {
            Self::ExponentialBackoff { max_retries, .. } => retry_count < *max_retries,
            Self::Forever { .. } => true,
        }
    }

    /// Sleep before retry number `retry_count`, given a jitter sample
    ///
    /// Backoff sleeps `base * max(1, jitter % 2^(retry_count + 1))`, capped.
    pub fn sleep_ms_with_jitter(&self, retry_count: u32, jitter: u64) -> u64 {
        match self {
            Self::ExponentialBackoff {
                base_sleep_ms,
                max_sleep_ms,
                ..
            } => {
                let exponent = retry_count.saturating_add(1).min(BACKOFF_EXPONENT_MAX);
                let multiplier = (jitter % (1u64 << exponent)).max(1);
                base_sleep_ms.saturating_mul(multiplier).min(*max_sleep_ms)
            }
            Self::Forever { interval_ms } => *interval_ms,
        }
    }

    /// Sleep before retry number `retry_count` with random jitter
    pub fn sleep_ms(&self, retry_count: u32) -> u64 {
        let jitter = rand::thread_rng().gen::<u64>();
        self.sleep_ms_with_jitter(retry_count, jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::registration()
    }
}

/// Sleep for `ms`, returning `Cancelled` if the token fires first
pub async fn sleep_or_cancel(ms: u64, cancel: &CancellationToken) -> CoordResult<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(CoordError::Cancelled),
        _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(()),
    }
}

/// Run `op` under `policy`, retrying retriable errors
///
/// Non-retriable errors are returned immediately. When a bounded policy is
/// exhausted the last error is returned.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut op: F,
) -> CoordResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CoordResult<T>>,
{
    let mut retry_count: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(CoordError::Cancelled);
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retriable() && policy.allows_retry(retry_count) => {
                let sleep_ms = policy.sleep_ms(retry_count);
                debug!(
                    operation,
                    retry = retry_count + 1,
                    sleep_ms,
                    error = %e,
                    "retrying"
                );
                sleep_or_cancel(sleep_ms, cancel).await?;
                retry_count = retry_count.saturating_add(1);
            }
            Err(e) => return Err(e),
        }
    }
}
