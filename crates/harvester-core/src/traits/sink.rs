// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage sink trait for exported records.

use async_trait::async_trait;

use crate::error::HarvesterError;
use crate::types::Record;

/// A durable destination for groups, messages, jobs, and account snapshots.
///
/// Sinks are fanned out independently: a failing sink never blocks or rolls
/// back an append that another sink accepted.
#[async_trait]
pub trait StorageSink: Send + Sync + 'static {
    /// Name used in logs and in the run summary's failure counts.
    fn name(&self) -> &str;

    /// Durably appends one record. The record's kind selects the table/index.
    async fn append(&self, record: &Record) -> Result<(), HarvesterError>;

    /// Flushes buffered writes, if the sink buffers.
    async fn flush(&self) -> Result<(), HarvesterError> {
        Ok(())
    }
}
