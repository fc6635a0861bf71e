// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Harvester crawler.
//!
//! This crate provides the error type, the domain types (accounts, groups,
//! messages, audit rows, sink records), and the capability traits through
//! which the crawl core talks to the network, the classifier, storage sinks,
//! and the clock.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::HarvesterError;
pub use types::{
    Account, AccountState, Candidate, Classification, Group, GroupId, GroupState, HealthStatus,
    JoinAttempt, JoinOutcome, JoinState, Label, Message, RawMessage, Record, RecordKind,
    ScrapeAttempt, ScrapeState,
};

pub use traits::{Classifier, Clock, NetworkClient, StorageSink, SystemClock};
