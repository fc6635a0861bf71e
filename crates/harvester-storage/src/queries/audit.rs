// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit trail of join and scrape attempts.

use harvester_core::{GroupId, HarvesterError, JoinAttempt, JoinState, ScrapeAttempt};
use rusqlite::{Connection, params};

use crate::database::{Database, map_tr_err};
use crate::models::{SuccessfulJoin, enum_from_sql, ts_from_sql, ts_to_sql};

/// Append a join attempt. Re-inserting the same attempt id is ignored.
pub async fn insert_join_attempt(db: &Database, attempt: &JoinAttempt) -> Result<(), HarvesterError> {
    let attempt = attempt.clone();
    db.connection()
        .call(move |conn| {
            insert_join_attempt_in(conn, &attempt)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// `insert_join_attempt` on a caller-held connection or transaction.
pub fn insert_join_attempt_in(conn: &Connection, attempt: &JoinAttempt) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO join_attempts (id, account, group_id, attempted_at, outcome, detail)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            attempt.id,
            attempt.account,
            attempt.group_id.as_str(),
            ts_to_sql(&attempt.attempted_at),
            attempt.outcome.to_string(),
            attempt.detail,
        ],
    )?;
    Ok(())
}

/// Append a scrape attempt.
pub async fn insert_scrape_attempt(
    db: &Database,
    attempt: &ScrapeAttempt,
) -> Result<(), HarvesterError> {
    let id = attempt.id.clone();
    let account = attempt.account.clone();
    let group_id = attempt.group_id.as_str().to_string();
    let attempted_at = ts_to_sql(&attempt.attempted_at);
    let outcome = attempt.outcome.to_string();
    let (fetched, persisted, duplicates) = (attempt.fetched, attempt.persisted, attempt.duplicates);
    let cursor = attempt.cursor;
    let detail = attempt.detail.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO scrape_attempts
                     (id, account, group_id, attempted_at, outcome, fetched, persisted, duplicates, cursor, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    account,
                    group_id,
                    attempted_at,
                    outcome,
                    fetched,
                    persisted,
                    duplicates,
                    cursor,
                    detail
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Join attempts against one group, oldest first.
pub async fn join_attempts_for(
    db: &Database,
    group_id: &GroupId,
) -> Result<Vec<JoinAttempt>, HarvesterError> {
    let group_id = group_id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, account, group_id, attempted_at, outcome, detail
                 FROM join_attempts WHERE group_id = ?1
                 ORDER BY attempted_at ASC, rowid ASC",
            )?;
            let attempts = stmt
                .query_map(params![group_id], |row| {
                    let attempted_at: String = row.get(3)?;
                    let outcome: String = row.get(4)?;
                    Ok(JoinAttempt {
                        id: row.get(0)?,
                        account: row.get(1)?,
                        group_id: GroupId(row.get(2)?),
                        attempted_at: ts_from_sql(3, &attempted_at)?,
                        outcome: enum_from_sql::<JoinState>(4, &outcome)?,
                        detail: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(attempts)
        })
        .await
        .map_err(map_tr_err)
}

/// Every successful join in the audit trail, oldest first.
///
/// This is the source of truth when the quota ledger and the joined-group
/// index are rebuilt.
pub async fn successful_joins(db: &Database) -> Result<Vec<SuccessfulJoin>, HarvesterError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, account, group_id, substr(attempted_at, 1, 10)
                 FROM join_attempts WHERE outcome = ?1
                 ORDER BY attempted_at ASC, rowid ASC",
            )?;
            let joins = stmt
                .query_map(params![JoinState::Joined.to_string()], |row| {
                    Ok(SuccessfulJoin {
                        attempt_id: row.get(0)?,
                        account: row.get(1)?,
                        group_id: row.get(2)?,
                        date: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(joins)
        })
        .await
        .map_err(map_tr_err)
}

/// Join attempt totals per outcome for one UTC date (`%Y-%m-%d`).
pub async fn join_outcome_counts(
    db: &Database,
    date: &str,
) -> Result<Vec<(JoinState, u64)>, HarvesterError> {
    let prefix = format!("{date}%");
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT outcome, COUNT(*) FROM join_attempts
                 WHERE attempted_at LIKE ?1 GROUP BY outcome ORDER BY outcome",
            )?;
            let counts = stmt
                .query_map(params![prefix], |row| {
                    let outcome: String = row.get(0)?;
                    let n: i64 = row.get(1)?;
                    Ok((enum_from_sql::<JoinState>(0, &outcome)?, n as u64))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(counts)
        })
        .await
        .map_err(map_tr_err)
}

/// Number of scrape attempts recorded for one group.
pub async fn scrape_attempt_count(db: &Database, group_id: &GroupId) -> Result<u64, HarvesterError> {
    let group_id = group_id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM scrape_attempts WHERE group_id = ?1",
                params![group_id],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
        .map_err(map_tr_err)
}
