// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable set of joined groups and ingested messages.
//!
//! Message keys go through two steps. `claim` inserts an unpersisted row
//! tagged with this index's owner id; `mark` flips it to persisted once a sink
//! has the record. Only persisted rows count as duplicates, so a claim left
//! behind by a crashed run is taken over by the next one instead of hiding an
//! unstored message. All statements run on the shared writer connection, so
//! racing workers see exactly one `Claimed`.

use std::fmt;
use std::sync::Arc;

use harvester_core::{GroupId, HarvesterError, JoinState};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

/// A deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    /// Membership in a group.
    Group(GroupId),
    /// A message within a group.
    Message(GroupId, i64),
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupKey::Group(group) => write!(f, "{group}"),
            DedupKey::Message(group, id) => write!(f, "{group}:{id}"),
        }
    }
}

/// Answer to a `claim`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The caller owns the key and must `mark` or `release` it.
    Claimed,
    /// The key is already recorded as persisted.
    Duplicate,
    /// Another worker of this run holds an unpersisted claim on the key.
    InFlight,
}

/// SQLite-backed dedup index. Clones share the connection and the owner id.
#[derive(Clone)]
pub struct DedupIndex {
    db: Database,
    owner: Arc<str>,
}

impl DedupIndex {
    /// Opens an index with a fresh owner id. Unpersisted claims held by any
    /// other owner are treated as abandoned.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            owner: uuid::Uuid::new_v4().to_string().into(),
        }
    }

    /// Whether the key has been recorded as persisted.
    pub async fn seen(&self, key: &DedupKey) -> Result<bool, HarvesterError> {
        let key = key.clone();
        self.db
            .connection()
            .call(move |conn| {
                let found = match &key {
                    DedupKey::Group(group) => conn.query_row(
                        "SELECT EXISTS(SELECT 1 FROM joined_groups WHERE group_id = ?1)",
                        params![group.as_str()],
                        |row| row.get::<_, bool>(0),
                    )?,
                    DedupKey::Message(group, id) => conn.query_row(
                        "SELECT EXISTS(SELECT 1 FROM ingested_messages
                         WHERE group_id = ?1 AND message_id = ?2 AND persisted = 1)",
                        params![group.as_str(), id],
                        |row| row.get::<_, bool>(0),
                    )?,
                };
                Ok(found)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Record the key as persisted, confirming a claim if one is held.
    /// Marking an already persisted key is a no-op.
    pub async fn mark(&self, key: &DedupKey) -> Result<(), HarvesterError> {
        let key = key.clone();
        self.db
            .connection()
            .call(move |conn| {
                match &key {
                    DedupKey::Group(group) => conn.execute(
                        "INSERT OR IGNORE INTO joined_groups (group_id) VALUES (?1)",
                        params![group.as_str()],
                    )?,
                    DedupKey::Message(group, id) => conn.execute(
                        "INSERT INTO ingested_messages (group_id, message_id, persisted)
                         VALUES (?1, ?2, 1)
                         ON CONFLICT (group_id, message_id) DO UPDATE SET persisted = 1",
                        params![group.as_str(), id],
                    )?,
                };
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Atomically take ownership of the key.
    ///
    /// A group key is either claimed or a duplicate. A message key whose
    /// unpersisted claim belongs to another owner is taken over.
    pub async fn claim(&self, key: &DedupKey) -> Result<Claim, HarvesterError> {
        let key = key.clone();
        let owner = self.owner.clone();
        self.db
            .connection()
            .call(move |conn| {
                let (group, id) = match &key {
                    DedupKey::Group(group) => {
                        let inserted = conn.execute(
                            "INSERT OR IGNORE INTO joined_groups (group_id) VALUES (?1)",
                            params![group.as_str()],
                        )?;
                        return Ok(if inserted > 0 { Claim::Claimed } else { Claim::Duplicate });
                    }
                    DedupKey::Message(group, id) => (group.as_str(), *id),
                };

                let tx = conn.transaction()?;
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO ingested_messages (group_id, message_id, persisted, claimed_by)
                     VALUES (?1, ?2, 0, ?3)",
                    params![group, id, &*owner],
                )?;
                let claim = if inserted > 0 {
                    Claim::Claimed
                } else {
                    let row: Option<(bool, Option<String>)> = tx
                        .query_row(
                            "SELECT persisted, claimed_by FROM ingested_messages
                             WHERE group_id = ?1 AND message_id = ?2",
                            params![group, id],
                            |row| Ok((row.get(0)?, row.get(1)?)),
                        )
                        .optional()?;
                    match row {
                        Some((true, _)) => Claim::Duplicate,
                        Some((false, Some(holder))) if *holder == *owner => Claim::InFlight,
                        _ => {
                            tx.execute(
                                "UPDATE ingested_messages SET claimed_by = ?3
                                 WHERE group_id = ?1 AND message_id = ?2 AND persisted = 0",
                                params![group, id, &*owner],
                            )?;
                            Claim::Claimed
                        }
                    }
                };
                tx.commit()?;
                Ok(claim)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Undo a claim whose record never reached any sink.
    ///
    /// Persisted messages and claims held by other owners are left alone.
    pub async fn release(&self, key: &DedupKey) -> Result<(), HarvesterError> {
        let key = key.clone();
        let owner = self.owner.clone();
        self.db
            .connection()
            .call(move |conn| {
                match &key {
                    DedupKey::Group(group) => conn.execute(
                        "DELETE FROM joined_groups WHERE group_id = ?1",
                        params![group.as_str()],
                    )?,
                    DedupKey::Message(group, id) => conn.execute(
                        "DELETE FROM ingested_messages
                         WHERE group_id = ?1 AND message_id = ?2 AND persisted = 0 AND claimed_by = ?3",
                        params![group.as_str(), id, &*owner],
                    )?,
                };
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Number of persisted messages recorded for a group.
    pub async fn message_count(&self, group: &GroupId) -> Result<u64, HarvesterError> {
        let group = group.as_str().to_string();
        self.db
            .connection()
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM ingested_messages WHERE group_id = ?1 AND persisted = 1",
                    params![group],
                    |row| row.get(0),
                )?;
                Ok(n as u64)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Rebuild the joined-group set from the join audit trail.
    ///
    /// Returns the number of groups in the rebuilt set.
    pub async fn rebuild_joined(&self) -> Result<usize, HarvesterError> {
        let joined = JoinState::Joined.to_string();
        let member = JoinState::AlreadyMember.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM joined_groups", [])?;
                let n = tx.execute(
                    "INSERT INTO joined_groups (group_id, joined_at)
                     SELECT group_id, MIN(attempted_at) FROM join_attempts
                     WHERE outcome IN (?1, ?2)
                     GROUP BY group_id",
                    params![joined, member],
                )?;
                tx.commit()?;
                Ok(n)
            })
            .await
            .map_err(map_tr_err)
    }
}
