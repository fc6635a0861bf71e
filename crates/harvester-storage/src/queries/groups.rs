// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Candidate group persistence: backlog, lifecycle state, scrape cursors.

use chrono::{DateTime, Utc};
use harvester_core::{Candidate, Group, GroupId, GroupState, HarvesterError};
use rusqlite::{Connection, params};

use crate::database::{Database, map_tr_err};
use crate::models::{GroupCounts, enum_from_sql, opt_ts_from_sql, ts_to_sql};

const GROUP_COLUMNS: &str =
    "id, reference, category, priority, seq, state, cursor, last_scraped_at, joined_by";

/// Insert candidates that are not yet known, in the given order.
///
/// Existing groups are untouched, so a blacklisted group stays blacklisted
/// when the candidate file lists it again. Returns the number of new groups.
pub async fn upsert_candidates(
    db: &Database,
    candidates: Vec<Candidate>,
) -> Result<usize, HarvesterError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut next_seq: i64 =
                    tx.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM groups", [], |row| {
                        row.get(0)
                    })?;
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO groups (id, reference, category, priority, seq)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for candidate in &candidates {
                    let id = GroupId::from_reference(&candidate.reference);
                    let changed = stmt.execute(params![
                        id.as_str(),
                        candidate.reference,
                        candidate.category,
                        candidate.priority,
                        next_seq,
                    ])?;
                    if changed > 0 {
                        inserted += 1;
                        next_seq += 1;
                    }
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
        .map_err(map_tr_err)
}

/// Pending groups, highest priority first, then insertion order.
pub async fn pending_groups(db: &Database) -> Result<Vec<Group>, HarvesterError> {
    groups_in_state(db, GroupState::Pending, "priority DESC, seq ASC").await
}

/// Joined groups in insertion order.
pub async fn joined_groups(db: &Database) -> Result<Vec<Group>, HarvesterError> {
    groups_in_state(db, GroupState::Joined, "seq ASC").await
}

async fn groups_in_state(
    db: &Database,
    state: GroupState,
    order: &'static str,
) -> Result<Vec<Group>, HarvesterError> {
    let sql = format!("SELECT {GROUP_COLUMNS} FROM groups WHERE state = ?1 ORDER BY {order}");
    let state = state.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let groups = stmt
                .query_map(params![state], row_to_group)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(groups)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one group by id.
pub async fn get_group(db: &Database, id: &GroupId) -> Result<Option<Group>, HarvesterError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = ?1"))?;
            let mut rows = stmt.query_map(params![id], row_to_group)?;
            let group = rows.next().transpose()?;
            Ok(group)
        })
        .await
        .map_err(map_tr_err)
}

/// Record that `account` holds a membership in the group.
pub async fn mark_joined(
    db: &Database,
    id: &GroupId,
    account: &str,
    now: DateTime<Utc>,
) -> Result<(), HarvesterError> {
    let id = id.clone();
    let account = account.to_string();
    db.connection()
        .call(move |conn| {
            mark_joined_in(conn, &id, &account, now)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// `mark_joined` on a caller-held connection or transaction.
pub fn mark_joined_in(
    conn: &Connection,
    id: &GroupId,
    account: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE groups SET state = 'joined', joined_by = ?1, updated_at = ?2
         WHERE id = ?3 AND state != 'blacklisted'",
        params![account, ts_to_sql(&now), id.as_str()],
    )?;
    Ok(())
}

/// Blacklist a group permanently. Returns whether the group exists.
pub async fn blacklist_group(
    db: &Database,
    id: &GroupId,
    now: DateTime<Utc>,
) -> Result<bool, HarvesterError> {
    let id = id.clone();
    db.connection()
        .call(move |conn| Ok(blacklist_group_in(conn, &id, now)?))
        .await
        .map_err(map_tr_err)
}

/// `blacklist_group` on a caller-held connection or transaction.
pub fn blacklist_group_in(conn: &Connection, id: &GroupId, now: DateTime<Utc>) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE groups SET state = 'blacklisted', updated_at = ?1 WHERE id = ?2",
        params![ts_to_sql(&now), id.as_str()],
    )?;
    Ok(changed > 0)
}

/// Advance the scrape cursor and stamp the scrape time.
///
/// A `None` cursor leaves the stored one in place. The cursor never moves backwards.
pub async fn record_scrape(
    db: &Database,
    id: &GroupId,
    cursor: Option<i64>,
    scraped_at: DateTime<Utc>,
) -> Result<(), HarvesterError> {
    let id = id.as_str().to_string();
    let scraped_at = ts_to_sql(&scraped_at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE groups SET
                     cursor = CASE
                         WHEN ?1 IS NULL THEN cursor
                         WHEN cursor IS NULL OR ?1 > cursor THEN ?1
                         ELSE cursor
                     END,
                     last_scraped_at = ?2,
                     updated_at = ?2
                 WHERE id = ?3",
                params![cursor, scraped_at, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Number of groups in each lifecycle state.
pub async fn group_counts(db: &Database) -> Result<GroupCounts, HarvesterError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM groups GROUP BY state")?;
            let mut counts = GroupCounts::default();
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (state, n) = row?;
                let n = n as u64;
                match state.as_str() {
                    "pending" => counts.pending = n,
                    "joined" => counts.joined = n,
                    "blacklisted" => counts.blacklisted = n,
                    _ => {}
                }
            }
            Ok(counts)
        })
        .await
        .map_err(map_tr_err)
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    let state: String = row.get(5)?;
    Ok(Group {
        id: GroupId(row.get(0)?),
        reference: row.get(1)?,
        category: row.get(2)?,
        priority: row.get(3)?,
        seq: row.get(4)?,
        state: enum_from_sql(5, &state)?,
        cursor: row.get(6)?,
        last_scraped_at: opt_ts_from_sql(7, row.get(7)?)?,
        joined_by: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn candidate(reference: &str, priority: i64) -> Candidate {
        Candidate {
            reference: reference.to_string(),
            category: "jobs".to_string(),
            priority,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn backlog_orders_by_priority_then_insertion() {
        let (db, _dir) = setup_db().await;
        let inserted = upsert_candidates(
            &db,
            vec![
                candidate("https://t.me/a", 1),
                candidate("https://t.me/b", 3),
                candidate("https://t.me/c", 3),
                candidate("https://t.me/d/", 2),
            ],
        )
        .await
        .unwrap();
        assert_eq!(inserted, 4);

        let ids: Vec<String> = pending_groups(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.id.0)
            .collect();
        assert_eq!(
            ids,
            vec!["https://t.me/b", "https://t.me/c", "https://t.me/d", "https://t.me/a"]
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn re_upsert_keeps_blacklist_and_seq() {
        let (db, _dir) = setup_db().await;
        upsert_candidates(&db, vec![candidate("https://t.me/a", 1)])
            .await
            .unwrap();
        let id = GroupId::from_reference("https://t.me/a");
        assert!(blacklist_group(&db, &id, now()).await.unwrap());

        let inserted = upsert_candidates(
            &db,
            vec![candidate("https://t.me/a", 3), candidate("https://t.me/b", 1)],
        )
        .await
        .unwrap();
        assert_eq!(inserted, 1);

        let a = get_group(&db, &id).await.unwrap().unwrap();
        assert_eq!(a.state, GroupState::Blacklisted);
        let b = get_group(&db, &GroupId::from_reference("https://t.me/b"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(b.seq, a.seq + 1);

        let counts = group_counts(&db).await.unwrap();
        assert_eq!(counts.blacklisted, 1);
        assert_eq!(counts.pending, 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn joined_group_tracks_holder_and_cursor() {
        let (db, _dir) = setup_db().await;
        upsert_candidates(&db, vec![candidate("https://t.me/a", 1)])
            .await
            .unwrap();
        let id = GroupId::from_reference("https://t.me/a");

        mark_joined(&db, &id, "alpha", now()).await.unwrap();
        record_scrape(&db, &id, Some(42), now()).await.unwrap();
        // Older cursor and empty batches never move it back.
        record_scrape(&db, &id, Some(17), now()).await.unwrap();
        record_scrape(&db, &id, None, now()).await.unwrap();

        let joined = joined_groups(&db).await.unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].joined_by.as_deref(), Some("alpha"));
        assert_eq!(joined[0].cursor, Some(42));
        assert_eq!(joined[0].last_scraped_at, Some(now()));

        db.close().await.unwrap();
    }
}
