// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the persisted crawl state.

pub mod accounts;
pub mod audit;
pub mod groups;
pub mod joins;
