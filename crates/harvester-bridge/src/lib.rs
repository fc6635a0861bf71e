// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Real network client for the Harvester crawler.
//!
//! [`BridgeClient`] talks JSON over HTTP to a session bridge service that
//! holds the platform sessions, and maps its responses onto
//! [`JoinOutcome`](harvester_core::JoinOutcome) and
//! [`HarvesterError`](harvester_core::HarvesterError).

pub mod client;
pub mod types;

pub use client::BridgeClient;
