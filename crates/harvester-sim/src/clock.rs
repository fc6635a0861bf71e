// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Virtual clock for simulated runs and tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvester_core::Clock;

/// A [`Clock`] that only moves when told to.
///
/// `sleep` advances the clock by the requested duration and returns after a
/// single scheduler yield, so a simulated crawl that waits out a ten-minute
/// cooldown finishes in microseconds while observing the same timestamps a
/// real run would.
#[derive(Debug)]
pub struct ManualClock {
    /// Milliseconds since the Unix epoch.
    now_ms: AtomicI64,
    slept_ms: AtomicI64,
}

/// 2026-03-01T08:00:00Z.
const DEFAULT_START_MS: i64 = 1_772_352_000_000;

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now_ms: AtomicI64::new(DEFAULT_START_MS),
            slept_ms: AtomicI64::new(0),
        }
    }
}

impl ManualClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now_ms: AtomicI64::new(start.timestamp_millis()),
            slept_ms: AtomicI64::new(0),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(millis(by), Ordering::SeqCst);
    }

    /// Jumps to an absolute instant (backwards jumps are allowed).
    pub fn set(&self, to: DateTime<Utc>) {
        self.now_ms.store(to.timestamp_millis(), Ordering::SeqCst);
    }

    /// Total virtual time spent in [`Clock::sleep`].
    pub fn slept(&self) -> Duration {
        Duration::from_millis(self.slept_ms.load(Ordering::SeqCst).max(0) as u64)
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms.load(Ordering::SeqCst)).unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        let ms = millis(duration);
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
        self.slept_ms.fetch_add(ms, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
