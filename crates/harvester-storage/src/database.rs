// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All reads and writes go through tokio-rusqlite's single background thread.
//! `Database` is cheap to clone; clones share that one connection, which is
//! what makes dedup claims and quota commits race-free.

use std::path::Path;

use harvester_core::HarvesterError;
use tracing::debug;

use crate::migrations;

/// Pragmas applied to every connection.
const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON;
     PRAGMA busy_timeout = 5000;
     PRAGMA synchronous = NORMAL;";

/// Convert a tokio-rusqlite error into `HarvesterError::Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> HarvesterError {
    HarvesterError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the core crawler database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database in WAL mode and run migrations.
    pub async fn open(path: &str) -> Result<Self, HarvesterError> {
        Self::open_with(path, true).await
    }

    /// Open the database, choosing the journal mode explicitly.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, HarvesterError> {
        let owned = path.to_string();
        tokio::task::spawn_blocking(move || prepare(&owned, wal_mode))
            .await
            .map_err(|e| HarvesterError::Internal(format!("database setup task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| HarvesterError::Storage {
                source: Box::new(e),
            })?;
        conn.call(|conn| conn.execute_batch(CONNECTION_PRAGMAS))
            .await
            .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The shared connection. Every query module goes through `call()` on it.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Close the background connection thread.
    pub async fn close(self) -> Result<(), HarvesterError> {
        self.conn.close().await.map_err(|e| HarvesterError::Storage {
            source: Box::new(e),
        })
    }
}

/// Create the parent directory, set the journal mode, and apply migrations
/// on a short-lived synchronous connection.
fn prepare(path: &str, wal_mode: bool) -> Result<(), HarvesterError> {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| HarvesterError::Storage {
            source: Box::new(e),
        })?;
    }

    let mut conn = rusqlite::Connection::open(path).map_err(|e| HarvesterError::Storage {
        source: Box::new(e),
    })?;
    let journal = if wal_mode { "WAL" } else { "DELETE" };
    conn.pragma_update(None, "journal_mode", journal)
        .map_err(|e| HarvesterError::Storage {
            source: Box::new(e),
        })?;
    migrations::run_migrations(&mut conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_schema_in_wal_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("crawl.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();

        let (mode, tables): (String, i64) = db
            .connection()
            .call(|conn| -> Result<(String, i64), rusqlite::Error> {
                let mode = conn.pragma_query_value(None, "journal_mode", |row| row.get(0))?;
                let tables = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
                     AND name IN ('accounts', 'groups', 'quota_ledger', 'ingested_messages')",
                    [],
                    |row| row.get(0),
                )?;
                Ok((mode, tables))
            })
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        assert_eq!(tables, 4);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopening_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crawl.db");
        let path = path.to_str().unwrap();

        let db = Database::open(path).await.unwrap();
        db.close().await.unwrap();
        let db = Database::open_with(path, false).await.unwrap();
        db.close().await.unwrap();
    }
}
