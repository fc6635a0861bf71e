// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retry of transient network failures with capped exponential backoff.

use std::future::Future;
use std::time::Duration;

use harvester_config::model::RetryConfig;
use harvester_core::{Clock, HarvesterError};
use tracing::warn;

use crate::rate_limiter::{DelayKind, RateLimiter};

/// Attempt budget and backoff schedule for transient errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Backoff after the `attempt`-th failure (1-based): `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Outcome of [`with_retry`]: the final result plus how many attempts it took.
#[derive(Debug)]
pub struct Retried<T> {
    pub result: Result<T, HarvesterError>,
    pub attempts: u32,
}

/// Runs `op` until it succeeds, fails non-transiently, or the budget is spent.
///
/// Every attempt, retries included, first passes through the rate limiter's
/// `kind` delay; failed attempts additionally wait the backoff.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    limiter: &RateLimiter,
    clock: &dyn Clock,
    kind: DelayKind,
    mut op: F,
) -> Retried<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, HarvesterError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        limiter.delay(kind).await;
        match op().await {
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let backoff = policy.backoff(attempt);
                warn!(
                    %kind,
                    attempt,
                    max_attempts = policy.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying after backoff"
                );
                clock.sleep(backoff).await;
            }
            result => {
                return Retried {
                    result,
                    attempts: attempt,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use harvester_config::model::RateLimitConfig;
    use harvester_sim::ManualClock;

    fn policy() -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 800,
        })
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(500));
        assert_eq!(p.backoff(2), Duration::from_millis(800));
        assert_eq!(p.backoff(30), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn transient_errors_retry_through_the_limiter() {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::simulated(&RateLimitConfig::default(), clock.clone());
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let out = with_retry(&policy(), &limiter, clock.as_ref(), DelayKind::Join, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(HarvesterError::transient("reset"))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(out.result.unwrap(), 7);
        assert_eq!(out.attempts, 3);
        assert_eq!(limiter.calls(DelayKind::Join), 3);
        assert_eq!(clock.slept(), Duration::from_millis(1300));
    }

    #[tokio::test]
    async fn budget_exhaustion_returns_last_error() {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::simulated(&RateLimitConfig::default(), clock.clone());
        let out: Retried<()> = with_retry(&policy(), &limiter, clock.as_ref(), DelayKind::Scrape, || async {
            Err(HarvesterError::transient("still down"))
        })
        .await;
        assert!(out.result.unwrap_err().is_transient());
        assert_eq!(out.attempts, 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::simulated(&RateLimitConfig::default(), clock.clone());
        let out: Retried<()> = with_retry(&policy(), &limiter, clock.as_ref(), DelayKind::Join, || async {
            Err(HarvesterError::FloodWait { seconds: 60 })
        })
        .await;
        assert!(matches!(out.result, Err(HarvesterError::FloodWait { seconds: 60 })));
        assert_eq!(out.attempts, 1);
    }
}
