// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Simulation and test doubles for the Harvester crawler.
//!
//! Lets a full crawl run with identical control flow but without a network,
//! without real waiting, and without touching external storage.
//!
//! # Components
//!
//! - [`SimulationStub`] - Seeded, scriptable [`NetworkClient`](harvester_core::NetworkClient)
//! - [`ManualClock`] - Virtual clock whose sleeps advance time instantly
//! - [`MemorySink`] - In-memory storage sink with failure injection

pub mod clock;
pub mod corpus;
pub mod sink;
pub mod stub;

pub use clock::ManualClock;
pub use sink::MemorySink;
pub use stub::{FetchScript, JoinScript, SimulationStub, StubCall};
