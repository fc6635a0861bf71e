// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory storage sink for deterministic testing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use harvester_core::{GroupId, HarvesterError, Record, RecordKind, StorageSink};
use tokio::sync::Mutex;

/// A storage sink that keeps every accepted record in memory.
///
/// Can be switched into a failing mode, in which every append is rejected
/// with [`HarvesterError::Sink`] and counted.
pub struct MemorySink {
    name: String,
    records: Arc<Mutex<Vec<Record>>>,
    failing: AtomicBool,
    rejected: AtomicU64,
}

impl MemorySink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: Arc::new(Mutex::new(Vec::new())),
            failing: AtomicBool::new(false),
            rejected: AtomicU64::new(0),
        }
    }

    /// A sink that rejects every append until [`MemorySink::set_failing`] clears it.
    pub fn failing(name: &str) -> Self {
        let sink = Self::new(name);
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of appends rejected so far.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }

    /// Every accepted record, in append order.
    pub async fn records(&self) -> Vec<Record> {
        self.records.lock().await.clone()
    }

    pub async fn records_of(&self, kind: RecordKind) -> Vec<Record> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.kind() == kind)
            .cloned()
            .collect()
    }

    /// `(group, message id)` of every accepted message record, in append order.
    pub async fn message_keys(&self) -> Vec<(GroupId, i64)> {
        self.records
            .lock()
            .await
            .iter()
            .filter_map(|r| match r {
                Record::Message(m) => Some((m.group_id.clone(), m.message_id)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl StorageSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn append(&self, record: &Record) -> Result<(), HarvesterError> {
        if self.failing.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(HarvesterError::sink(&self.name, "injected failure"));
        }
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use harvester_core::Message;

    fn message(id: i64) -> Record {
        Record::Message(Message {
            group_id: GroupId::from_reference("g"),
            message_id: id,
            sender_id: None,
            timestamp: Utc::now(),
            text: "hello".into(),
            classification: None,
        })
    }

    #[tokio::test]
    async fn stores_accepted_records() {
        let sink = MemorySink::new("memory");
        sink.append(&message(1)).await.unwrap();
        sink.append(&message(2)).await.unwrap();
        assert_eq!(sink.records_of(RecordKind::Message).await.len(), 2);
        assert!(sink.records_of(RecordKind::Job).await.is_empty());
        assert_eq!(
            sink.message_keys().await,
            vec![(GroupId::from_reference("g"), 1), (GroupId::from_reference("g"), 2)]
        );
    }

    #[tokio::test]
    async fn failing_sink_rejects_and_counts() {
        let sink = MemorySink::failing("tabular");
        let err = sink.append(&message(1)).await.unwrap_err();
        assert!(matches!(err, HarvesterError::Sink { ref sink, .. } if sink == "tabular"));
        assert_eq!(sink.rejected(), 1);
        assert!(sink.records().await.is_empty());

        sink.set_failing(false);
        sink.append(&message(1)).await.unwrap();
        assert_eq!(sink.records().await.len(), 1);
    }
}
