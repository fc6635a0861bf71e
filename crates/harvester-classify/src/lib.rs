// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message classification for the Harvester crawler.
//!
//! [`KeywordClassifier`] scores messages as job postings using keyword and
//! pattern heuristics. No model, no network.

pub mod keyword;

pub use keyword::KeywordClassifier;
