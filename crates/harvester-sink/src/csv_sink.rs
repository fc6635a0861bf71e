// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tabular export: one CSV file per record kind.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use harvester_core::{HarvesterError, Record, RecordKind, StorageSink};
use tokio::sync::Mutex;
use tracing::debug;

const SINK_NAME: &str = "csv";

/// Appends records to `<directory>/<kind>s.csv`, writing a header row when a
/// file is first created. Every row is flushed before `append` returns.
pub struct CsvSink {
    directory: PathBuf,
    writers: Mutex<HashMap<RecordKind, csv::Writer<File>>>,
}

impl CsvSink {
    /// Creates the export directory if needed.
    pub fn new(directory: impl AsRef<Path>) -> Result<Self, HarvesterError> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory).map_err(|e| HarvesterError::Sink {
            sink: SINK_NAME.to_string(),
            message: format!("cannot create {}: {e}", directory.display()),
            source: Some(Box::new(e)),
        })?;
        Ok(Self {
            directory,
            writers: Mutex::new(HashMap::new()),
        })
    }

    /// Path of the file holding records of `kind`.
    pub fn path_for(&self, kind: RecordKind) -> PathBuf {
        self.directory.join(format!("{kind}s.csv"))
    }

    fn open(&self, kind: RecordKind) -> Result<csv::Writer<File>, HarvesterError> {
        let path = self.path_for(kind);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_error(&path, e))?;
        let empty = file.metadata().map_err(|e| io_error(&path, e))?.len() == 0;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if empty {
            writer
                .write_record(Record::columns(kind))
                .map_err(csv_error)?;
            debug!(path = %path.display(), "created export file");
        }
        Ok(writer)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> HarvesterError {
    HarvesterError::Sink {
        sink: SINK_NAME.to_string(),
        message: format!("{}: {e}", path.display()),
        source: Some(Box::new(e)),
    }
}

fn csv_error(e: csv::Error) -> HarvesterError {
    HarvesterError::Sink {
        sink: SINK_NAME.to_string(),
        message: e.to_string(),
        source: Some(Box::new(e)),
    }
}

#[async_trait]
impl StorageSink for CsvSink {
    fn name(&self) -> &str {
        SINK_NAME
    }

    async fn append(&self, record: &Record) -> Result<(), HarvesterError> {
        let kind = record.kind();
        let mut writers = self.writers.lock().await;
        if !writers.contains_key(&kind) {
            let writer = self.open(kind)?;
            writers.insert(kind, writer);
        }
        let Some(writer) = writers.get_mut(&kind) else {
            return Err(HarvesterError::Internal(format!("no writer for {kind}")));
        };

        writer.write_record(record.row()).map_err(csv_error)?;
        writer.flush().map_err(|e| io_error(&self.path_for(kind), e))
    }

    async fn flush(&self) -> Result<(), HarvesterError> {
        let mut writers = self.writers.lock().await;
        for (kind, writer) in writers.iter_mut() {
            writer.flush().map_err(|e| io_error(&self.path_for(*kind), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use harvester_core::{GroupId, Message};

    fn message(id: i64, text: &str) -> Record {
        Record::Message(Message {
            group_id: GroupId::from_reference("https://t.me/jobs"),
            message_id: id,
            sender_id: Some(7),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            text: text.to_string(),
            classification: None,
        })
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[tokio::test]
    async fn writes_header_once_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path()).unwrap();
        sink.append(&message(1, "hello, world")).await.unwrap();
        sink.append(&message(2, "line one\nline two")).await.unwrap();

        let rows = read_rows(&sink.path_for(RecordKind::Message));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], Record::columns(RecordKind::Message));
        assert_eq!(rows[1][1], "1");
        assert_eq!(rows[1][4], "hello, world");
        assert_eq!(rows[2][4], "line one line two");
    }

    #[tokio::test]
    async fn reopening_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        {
            let sink = CsvSink::new(dir.path()).unwrap();
            sink.append(&message(1, "first")).await.unwrap();
        }
        let sink = CsvSink::new(dir.path()).unwrap();
        sink.append(&message(2, "second")).await.unwrap();
        sink.flush().await.unwrap();

        let rows = read_rows(&sink.path_for(RecordKind::Message));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2][1], "2");
    }

    #[tokio::test]
    async fn kinds_go_to_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("nested")).unwrap();
        sink.append(&message(1, "x")).await.unwrap();
        assert!(sink.path_for(RecordKind::Message).ends_with("messages.csv"));
        assert!(sink.path_for(RecordKind::Message).exists());
        assert!(!sink.path_for(RecordKind::Job).exists());
    }
}
