// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time source abstraction.
//!
//! Cooldowns, quota dates, and cursors all read time through [`Clock`], so a
//! simulated run can advance virtual time without sleeping.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    /// Suspends the caller for `duration` of this clock's time.
    async fn sleep(&self, duration: Duration);

    /// Current UTC calendar day, the quota ledger's date key.
    fn today(&self) -> String {
        self.now().format("%Y-%m-%d").to_string()
    }
}

/// Wall-clock time backed by tokio timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
