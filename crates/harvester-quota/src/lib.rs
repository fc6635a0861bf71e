// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily join quota enforcement for the Harvester crawler.
//!
//! The [`QuotaLedger`] keeps durable per-account and global counters for the
//! current UTC day in SQLite, with an in-memory reservation table that keeps
//! concurrent workers from overshooting either cap.

pub mod ledger;

pub use ledger::{Admission, LedgerSnapshot, QuotaLedger};
