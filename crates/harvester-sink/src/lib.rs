// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage sinks for the Harvester crawler.
//!
//! [`CsvSink`] writes one CSV file per record kind, [`SearchIndexSink`]
//! indexes each record as a JSON document over HTTP, and [`SinkFanout`]
//! appends every record to all configured sinks independently.

pub mod csv_sink;
pub mod fanout;
pub mod search_index;

use std::sync::Arc;

use harvester_config::model::SinksConfig;
use harvester_core::{HarvesterError, StorageSink};

pub use csv_sink::CsvSink;
pub use fanout::{FanoutResult, SinkFanout};
pub use search_index::SearchIndexSink;

/// Builds every sink enabled in configuration.
pub fn sinks_from_config(config: &SinksConfig) -> Result<Vec<Arc<dyn StorageSink>>, HarvesterError> {
    let mut sinks: Vec<Arc<dyn StorageSink>> = Vec::new();
    if config.csv.enabled {
        sinks.push(Arc::new(CsvSink::new(&config.csv.directory)?));
    }
    if config.search_index.enabled {
        sinks.push(Arc::new(SearchIndexSink::from_config(&config.search_index)?));
    }
    Ok(sinks)
}
