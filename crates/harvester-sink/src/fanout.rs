// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Independent fan-out of records to every configured sink.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::future::join_all;
use harvester_core::{HealthStatus, Record, StorageSink};
use tracing::warn;

/// Outcome of appending one record to every sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutResult {
    pub accepted: usize,
    pub failed: usize,
}

impl FanoutResult {
    /// At least one sink durably holds the record. With no sinks
    /// configured the dedup index is the only record and nothing can fail.
    pub fn persisted(&self) -> bool {
        self.accepted > 0 || self.failed == 0
    }
}

struct SinkSlot {
    sink: Arc<dyn StorageSink>,
    failures: AtomicU64,
    degraded: AtomicBool,
}

/// Appends each record to all sinks. A failing sink is logged, counted and
/// marked degraded; it never blocks or undoes an append to another sink.
pub struct SinkFanout {
    slots: Vec<SinkSlot>,
}

impl SinkFanout {
    pub fn new(sinks: Vec<Arc<dyn StorageSink>>) -> Self {
        Self {
            slots: sinks
                .into_iter()
                .map(|sink| SinkSlot {
                    sink,
                    failures: AtomicU64::new(0),
                    degraded: AtomicBool::new(false),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Appends to every sink concurrently, so a slow sink adds no latency
    /// to the others.
    pub async fn append(&self, record: &Record) -> FanoutResult {
        let outcomes = join_all(self.slots.iter().map(|slot| slot.sink.append(record))).await;

        let mut result = FanoutResult {
            accepted: 0,
            failed: 0,
        };
        for (slot, outcome) in self.slots.iter().zip(outcomes) {
            match outcome {
                Ok(()) => result.accepted += 1,
                Err(e) => {
                    result.failed += 1;
                    let failures = slot.failures.fetch_add(1, Ordering::SeqCst) + 1;
                    if !slot.degraded.swap(true, Ordering::SeqCst) {
                        warn!(sink = slot.sink.name(), "sink degraded");
                    }
                    warn!(
                        sink = slot.sink.name(),
                        kind = %record.kind(),
                        id = %record.document_id(),
                        failures,
                        error = %e,
                        "sink append failed"
                    );
                }
            }
        }
        result
    }

    /// Flushes every sink, logging (not propagating) failures.
    pub async fn flush(&self) {
        for slot in &self.slots {
            if let Err(e) = slot.sink.flush().await {
                slot.failures.fetch_add(1, Ordering::SeqCst);
                slot.degraded.store(true, Ordering::SeqCst);
                warn!(sink = slot.sink.name(), error = %e, "sink flush failed");
            }
        }
    }

    /// Failure count per sink name.
    pub fn failures(&self) -> BTreeMap<String, u64> {
        self.slots
            .iter()
            .map(|s| (s.sink.name().to_string(), s.failures.load(Ordering::SeqCst)))
            .collect()
    }

    pub fn health(&self) -> Vec<(String, HealthStatus)> {
        self.slots
            .iter()
            .map(|s| {
                let status = if s.degraded.load(Ordering::SeqCst) {
                    HealthStatus::Degraded(format!(
                        "{} failed writes",
                        s.failures.load(Ordering::SeqCst)
                    ))
                } else {
                    HealthStatus::Healthy
                };
                (s.sink.name().to_string(), status)
            })
            .collect()
    }
}
