// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account lifecycle persistence.

use chrono::{DateTime, Utc};
use harvester_core::{AccountState, HarvesterError};
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::{opt_ts_from_sql, ts_to_sql};

/// Persisted account row.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRow {
    pub name: String,
    pub phone: String,
    pub state: AccountState,
}

/// Register an account, keeping any persisted state.
///
/// Only the phone is refreshed. A Disabled or Cooldown account stays that way
/// until `reinstate` or its cooldown expiry.
pub async fn register_account(db: &Database, name: &str, phone: &str) -> Result<(), HarvesterError> {
    let name = name.to_string();
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO accounts (name, phone) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET phone = excluded.phone",
                params![name, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one account, if registered.
pub async fn get_account(db: &Database, name: &str) -> Result<Option<AccountRow>, HarvesterError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT name, phone, state, resume_at FROM accounts WHERE name = ?1",
            )?;
            let mut rows = stmt.query_map(params![name], row_to_account)?;
            let row = rows.next().transpose()?;
            Ok(row)
        })
        .await
        .map_err(map_tr_err)
}

/// Every registered account, by name.
pub async fn list_accounts(db: &Database) -> Result<Vec<AccountRow>, HarvesterError> {
    db.connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare("SELECT name, phone, state, resume_at FROM accounts ORDER BY name")?;
            let rows = stmt
                .query_map([], row_to_account)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Persist a state transition.
pub async fn set_account_state(
    db: &Database,
    name: &str,
    state: &AccountState,
    now: DateTime<Utc>,
) -> Result<(), HarvesterError> {
    let name = name.to_string();
    let tag = state.as_str();
    let resume_at = state.resume_at().map(|t| ts_to_sql(&t));
    let updated_at = ts_to_sql(&now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET state = ?1, resume_at = ?2, updated_at = ?3 WHERE name = ?4",
                params![tag, resume_at, updated_at, name],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Return a Disabled or cooling-down account to Idle. Returns whether the account exists.
pub async fn reinstate_account(
    db: &Database,
    name: &str,
    now: DateTime<Utc>,
) -> Result<bool, HarvesterError> {
    let name = name.to_string();
    let updated_at = ts_to_sql(&now);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE accounts SET state = 'idle', resume_at = NULL, updated_at = ?1 WHERE name = ?2",
                params![updated_at, name],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccountRow> {
    let tag: String = row.get(2)?;
    let resume_at = opt_ts_from_sql(3, row.get(3)?)?;
    let state = AccountState::from_parts(&tag, resume_at).unwrap_or(AccountState::Idle);
    Ok(AccountRow {
        name: row.get(0)?,
        phone: row.get(1)?,
        state,
    })
}
