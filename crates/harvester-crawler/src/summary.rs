// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-of-run report.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use harvester_core::{JoinState, ScrapeState};
use serde::Serialize;
use strum::Display;

/// Why the crawl loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Every candidate was attempted.
    BacklogEmpty,
    /// The global daily cap was reached.
    GlobalCapReached,
    /// Every usable account reached its per-account cap.
    AccountQuotaExhausted,
    /// Every account is Disabled and needs `harvester reinstate`.
    AccountsDisabled,
    /// No account was usable for another reason (mixed disabled and capped).
    AccountsUnavailable,
    /// A shutdown signal stopped admission of new joins.
    Cancelled,
}

impl TerminationReason {
    /// Whether an operator needs to act before the next run.
    pub fn needs_intervention(self) -> bool {
        matches!(self, Self::AccountsDisabled | Self::AccountsUnavailable)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub termination: TerminationReason,
    /// Join attempts per terminal state.
    pub joins: BTreeMap<String, u64>,
    /// Scrape attempts per terminal state.
    pub scrapes: BTreeMap<String, u64>,
    pub messages_fetched: u64,
    pub messages_persisted: u64,
    pub duplicates: u64,
    pub jobs: u64,
    /// Groups joined before this run that were scraped again.
    pub rescraped_groups: u64,
    /// Failed appends per sink name.
    pub sink_failures: BTreeMap<String, u64>,
    pub global_joins_today: u32,
}

impl RunSummary {
    pub(crate) fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            termination: TerminationReason::BacklogEmpty,
            joins: BTreeMap::new(),
            scrapes: BTreeMap::new(),
            messages_fetched: 0,
            messages_persisted: 0,
            duplicates: 0,
            jobs: 0,
            rescraped_groups: 0,
            sink_failures: BTreeMap::new(),
            global_joins_today: 0,
        }
    }

    pub(crate) fn count_join(&mut self, state: JoinState) {
        *self.joins.entry(state.to_string()).or_default() += 1;
    }

    pub(crate) fn count_scrape(&mut self, state: ScrapeState) {
        *self.scrapes.entry(state.to_string()).or_default() += 1;
    }

    /// Join attempts that ended in `state`.
    pub fn joins_in(&self, state: JoinState) -> u64 {
        self.joins.get(&state.to_string()).copied().unwrap_or(0)
    }

    pub fn scrapes_in(&self, state: ScrapeState) -> u64 {
        self.scrapes.get(&state.to_string()).copied().unwrap_or(0)
    }

    pub fn total_joins(&self) -> u64 {
        self.joins.values().sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = self.finished_at - self.started_at;
        writeln!(f, "Run finished: {} ({}s)", self.termination, elapsed.num_seconds())?;
        if self.termination.needs_intervention() {
            writeln!(f, "  action required: reinstate disabled accounts")?;
        }
        writeln!(f, "  joins today (global): {}", self.global_joins_today)?;
        writeln!(f, "  join attempts: {}", self.total_joins())?;
        for (state, n) in &self.joins {
            writeln!(f, "    {state}: {n}")?;
        }
        writeln!(f, "  scrape attempts: {}", self.scrapes.values().sum::<u64>())?;
        for (state, n) in &self.scrapes {
            writeln!(f, "    {state}: {n}")?;
        }
        writeln!(
            f,
            "  messages: {} fetched, {} persisted, {} duplicates, {} jobs",
            self.messages_fetched, self.messages_persisted, self.duplicates, self.jobs
        )?;
        if self.rescraped_groups > 0 {
            writeln!(f, "  previously joined groups re-scraped: {}", self.rescraped_groups)?;
        }
        for (sink, n) in &self.sink_failures {
            writeln!(f, "  sink {sink}: {n} failed appends")?;
        }
        Ok(())
    }
}
