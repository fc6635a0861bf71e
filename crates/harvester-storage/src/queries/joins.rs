// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database effects of a finished join attempt, applied as one unit.
//!
//! The audit row, the group's lifecycle state and the joined-group set are
//! written together, so `rebuild` never sees a membership without the audit
//! row that justifies it, nor the reverse.

use harvester_core::{HarvesterError, JoinAttempt, JoinState};
use rusqlite::{Connection, params};

use crate::database::{Database, map_tr_err};
use crate::models::ts_to_sql;
use crate::queries::{audit, groups};

/// Write the attempt's audit row and the group changes its outcome implies.
///
/// Runs on a caller-held transaction so the quota commit of a successful
/// join can share it.
pub fn apply_join_outcome(conn: &Connection, attempt: &JoinAttempt) -> rusqlite::Result<()> {
    audit::insert_join_attempt_in(conn, attempt)?;
    match attempt.outcome {
        JoinState::Joined | JoinState::AlreadyMember => {
            groups::mark_joined_in(conn, &attempt.group_id, &attempt.account, attempt.attempted_at)?;
            conn.execute(
                "INSERT OR IGNORE INTO joined_groups (group_id, joined_at) VALUES (?1, ?2)",
                params![attempt.group_id.as_str(), ts_to_sql(&attempt.attempted_at)],
            )?;
        }
        JoinState::InviteInvalid | JoinState::ChannelFull => {
            groups::blacklist_group_in(conn, &attempt.group_id, attempt.attempted_at)?;
        }
        JoinState::FloodWaited | JoinState::Failed | JoinState::Unauthorized => {}
    }
    Ok(())
}

/// Record an attempt that consumes no quota in its own transaction.
pub async fn record_join_outcome(db: &Database, attempt: &JoinAttempt) -> Result<(), HarvesterError> {
    let attempt = attempt.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            apply_join_outcome(&tx, &attempt)?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use harvester_core::{Candidate, GroupId, GroupState};
    use tempfile::tempdir;

    use crate::dedup::{DedupIndex, DedupKey};

    async fn setup() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        groups::upsert_candidates(
            &db,
            vec![Candidate {
                reference: "https://t.me/g".to_string(),
                category: "jobs".to_string(),
                priority: 1,
            }],
        )
        .await
        .unwrap();
        (db, dir)
    }

    fn attempt(id: &str, outcome: JoinState) -> JoinAttempt {
        JoinAttempt {
            id: id.to_string(),
            account: "alpha".to_string(),
            group_id: GroupId::from_reference("https://t.me/g"),
            attempted_at: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
            outcome,
            detail: None,
        }
    }

    #[tokio::test]
    async fn joined_outcome_lands_state_membership_and_audit_together() {
        let (db, _dir) = setup().await;
        let joined = attempt("a1", JoinState::Joined);

        record_join_outcome(&db, &joined).await.unwrap();

        let group = groups::get_group(&db, &joined.group_id).await.unwrap().unwrap();
        assert_eq!(group.state, GroupState::Joined);
        assert_eq!(group.joined_by.as_deref(), Some("alpha"));
        let index = DedupIndex::new(db.clone());
        assert!(index.seen(&DedupKey::Group(joined.group_id.clone())).await.unwrap());
        let history = audit::successful_joins(&db).await.unwrap();
        assert_eq!(history.len(), 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_invite_blacklists_without_membership() {
        let (db, _dir) = setup().await;
        let rejected = attempt("a2", JoinState::InviteInvalid);

        record_join_outcome(&db, &rejected).await.unwrap();

        let group = groups::get_group(&db, &rejected.group_id).await.unwrap().unwrap();
        assert_eq!(group.state, GroupState::Blacklisted);
        let index = DedupIndex::new(db.clone());
        assert!(!index.seen(&DedupKey::Group(rejected.group_id.clone())).await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_write_leaves_no_partial_outcome() {
        let (db, _dir) = setup().await;
        let joined = attempt("a3", JoinState::Joined);

        let pending = joined.clone();
        let err = db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                apply_join_outcome(&tx, &pending)?;
                // Abort before commit, as a crash mid-write would.
                Err::<(), _>(rusqlite::Error::InvalidQuery)
            })
            .await;
        assert!(err.is_err());

        let group = groups::get_group(&db, &joined.group_id).await.unwrap().unwrap();
        assert_eq!(group.state, GroupState::Pending);
        assert!(audit::successful_joins(&db).await.unwrap().is_empty());

        db.close().await.unwrap();
    }
}
