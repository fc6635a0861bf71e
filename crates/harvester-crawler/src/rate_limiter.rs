// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Randomized human-like delays before every network-bound operation.
//!
//! Each [`DelayKind`] draws uniformly from its own configured `[min, max]`
//! range. In simulation every delay is zero, but calls are still counted and
//! logged in order so tests can assert the pacing sequence.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use harvester_config::model::{DelayRange, RateLimitConfig};
use harvester_core::Clock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strum::Display;
use tokio::sync::Mutex;
use tracing::debug;

/// Operation class a delay precedes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DelayKind {
    Join,
    Scrape,
    Generic,
}

impl DelayKind {
    fn index(self) -> usize {
        match self {
            DelayKind::Join => 0,
            DelayKind::Scrape => 1,
            DelayKind::Generic => 2,
        }
    }
}

pub struct RateLimiter {
    ranges: RateLimitConfig,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    simulated: bool,
    counts: [AtomicU64; 3],
    log: Mutex<Vec<DelayKind>>,
}

impl RateLimiter {
    /// Real pacing with entropy-seeded jitter.
    pub fn new(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::build(config, clock, StdRng::from_entropy(), false)
    }

    /// Zero-delay pacing that still records every call.
    pub fn simulated(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::build(config, clock, StdRng::seed_from_u64(0), true)
    }

    fn build(config: &RateLimitConfig, clock: Arc<dyn Clock>, rng: StdRng, simulated: bool) -> Self {
        Self {
            ranges: config.clone(),
            clock,
            rng: Mutex::new(rng),
            simulated,
            counts: Default::default(),
            log: Mutex::new(Vec::new()),
        }
    }

    fn range(&self, kind: DelayKind) -> DelayRange {
        match kind {
            DelayKind::Join => self.ranges.join,
            DelayKind::Scrape => self.ranges.scrape,
            DelayKind::Generic => self.ranges.generic,
        }
    }

    /// Waits the drawn delay for `kind` on the clock and returns it.
    pub async fn delay(&self, kind: DelayKind) -> Duration {
        self.counts[kind.index()].fetch_add(1, Ordering::SeqCst);
        self.log.lock().await.push(kind);

        let wait = if self.simulated {
            Duration::ZERO
        } else {
            let range = self.range(kind);
            let secs = if range.max_secs > range.min_secs {
                self.rng.lock().await.gen_range(range.min_secs..=range.max_secs)
            } else {
                range.min_secs
            };
            Duration::from_secs_f64(secs.max(0.0))
        };

        debug!(%kind, wait_ms = wait.as_millis() as u64, "rate limit delay");
        if !wait.is_zero() {
            self.clock.sleep(wait).await;
        }
        wait
    }

    /// Number of delays taken for `kind`.
    pub fn calls(&self, kind: DelayKind) -> u64 {
        self.counts[kind.index()].load(Ordering::SeqCst)
    }

    /// Every delay taken, in call order.
    pub async fn call_log(&self) -> Vec<DelayKind> {
        self.log.lock().await.clone()
    }
}
