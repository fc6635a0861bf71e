// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator commands: `reinstate`, `blacklist` and `rebuild-ledger`.

use std::sync::Arc;

use chrono::Utc;
use harvester_config::HarvesterConfig;
use harvester_core::{Candidate, GroupId, HarvesterError, SystemClock};
use harvester_quota::QuotaLedger;
use harvester_storage::queries::{accounts, groups};
use harvester_storage::{Database, DedupIndex};
use tracing::info;

async fn open(config: &HarvesterConfig) -> Result<Database, HarvesterError> {
    Database::open_with(&config.storage.database_path, config.storage.wal_mode).await
}

pub async fn reinstate(config: &HarvesterConfig, account: &str) -> Result<(), HarvesterError> {
    let db = open(config).await?;
    let found = reinstate_in(&db, account).await;
    db.close().await?;
    if found? {
        println!("Account '{account}' reinstated.");
    } else {
        println!("Account '{account}' not found.");
    }
    Ok(())
}

async fn reinstate_in(db: &Database, account: &str) -> Result<bool, HarvesterError> {
    let found = accounts::reinstate_account(db, account, Utc::now()).await?;
    if found {
        info!(account, "account reinstated by operator");
    }
    Ok(found)
}

pub async fn blacklist(config: &HarvesterConfig, group: &str) -> Result<(), HarvesterError> {
    let db = open(config).await?;
    let result = blacklist_in(&db, group).await;
    db.close().await?;
    let id = result?;
    println!("Group '{id}' blacklisted.");
    Ok(())
}

/// Blacklists a group, registering it first when it is not yet known so a
/// later candidate file cannot bring it back.
async fn blacklist_in(db: &Database, reference: &str) -> Result<GroupId, HarvesterError> {
    let id = GroupId::from_reference(reference);
    if id.as_str().is_empty() {
        return Err(HarvesterError::InvalidTarget {
            target: reference.to_string(),
            message: "empty group reference".into(),
        });
    }
    if !groups::blacklist_group(db, &id, Utc::now()).await? {
        groups::upsert_candidates(
            db,
            vec![Candidate {
                reference: reference.trim().to_string(),
                category: "manual".into(),
                priority: 0,
            }],
        )
        .await?;
        groups::blacklist_group(db, &id, Utc::now()).await?;
    }
    info!(group = %id, "group blacklisted by operator");
    Ok(id)
}

pub async fn rebuild_ledger(config: &HarvesterConfig) -> Result<(), HarvesterError> {
    let db = open(config).await?;
    let result = rebuild_in(config, &db).await;
    db.close().await?;
    let (commits, joined) = result?;
    println!("Replayed {commits} successful joins; {joined} groups in the joined set.");
    Ok(())
}

async fn rebuild_in(config: &HarvesterConfig, db: &Database) -> Result<(usize, usize), HarvesterError> {
    let ledger = QuotaLedger::new(&config.quota, db.clone(), Arc::new(SystemClock));
    let commits = ledger.rebuild().await?;
    let joined = DedupIndex::new(db.clone()).rebuild_joined().await?;
    Ok((commits, joined))
}
