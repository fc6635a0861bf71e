// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits the crawl core depends on.
//!
//! Every collaborator outside the orchestration core (network client,
//! classifier, storage sinks, time source) is consumed through one of these
//! narrow traits. They use `#[async_trait]` for dynamic dispatch.

pub mod classifier;
pub mod clock;
pub mod network;
pub mod sink;

pub use classifier::Classifier;
pub use clock::{Clock, SystemClock};
pub use network::NetworkClient;
pub use sink::StorageSink;
