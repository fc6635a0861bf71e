// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Harvester crawler.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, the durable dedup index, and typed
//! queries for accounts, groups and the attempt audit trail.

pub mod database;
pub mod dedup;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::{Database, map_tr_err};
pub use dedup::{Claim, DedupIndex, DedupKey};
pub use models::{GroupCounts, SuccessfulJoin};
