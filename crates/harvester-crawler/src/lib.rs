// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Crawl orchestration core for the Harvester crawler.
//!
//! The [`Orchestrator`] is the central coordinator that:
//! - Pulls pending groups from a priority-ordered backlog
//! - Leases accounts from the [`AccountPool`] under quota admission control
//! - Paces every network call through the [`RateLimiter`]
//! - Runs the join and scrape state machines and records their audit rows
//! - Stops cooperatively on cancellation and reports a [`RunSummary`]

pub mod account_pool;
pub mod join;
pub mod orchestrator;
pub mod rate_limiter;
pub mod retry;
pub mod scrape;
pub mod shutdown;
pub mod summary;

pub use account_pool::{AccountPool, Selection, account_from_config};
pub use join::JoinWorkflow;
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use rate_limiter::{DelayKind, RateLimiter};
pub use retry::{RetryPolicy, with_retry};
pub use scrape::{ScrapeReport, ScrapeWorkflow};
pub use shutdown::install_signal_handler;
pub use summary::{RunSummary, TerminationReason};
