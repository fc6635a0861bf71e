// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-account and global daily join counters.
//!
//! Counts live in the `quota_ledger` and `quota_global` tables keyed by UTC
//! date, so a restart picks up where the previous run stopped. Every commit
//! carries an idempotency key (the join attempt id) recorded in
//! `quota_commits`; replaying it is a no-op. A date with no rows counts as 0.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use harvester_config::model::QuotaConfig;
use harvester_core::{Clock, HarvesterError};
use harvester_storage::{Database, map_tr_err};
use rusqlite::params;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of asking the ledger for a join slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A slot is held for the account until `commit` or `release`.
    Granted,
    /// The account has used (or holds) all of today's joins.
    AccountCapped,
    /// All accounts together have used (or hold) today's global allowance.
    GlobalCapped,
}

/// Ledger values for one date, as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub date: String,
    pub accounts: BTreeMap<String, u32>,
    pub global: u32,
}

impl LedgerSnapshot {
    /// Sum of the per-account counters. Always equals `global`.
    pub fn account_sum(&self) -> u32 {
        self.accounts.values().sum()
    }
}

#[derive(Debug, Default)]
struct Counters {
    date: String,
    committed: HashMap<String, u32>,
    committed_global: u32,
    reserved: HashMap<String, u32>,
    reserved_global: u32,
}

impl Counters {
    fn held(&self, account: &str) -> u32 {
        self.committed.get(account).copied().unwrap_or(0)
            + self.reserved.get(account).copied().unwrap_or(0)
    }

    fn held_global(&self) -> u32 {
        self.committed_global + self.reserved_global
    }

    fn drop_reservation(&mut self, account: &str) -> bool {
        match self.reserved.get_mut(account) {
            Some(n) if *n > 0 => {
                *n -= 1;
                self.reserved_global = self.reserved_global.saturating_sub(1);
                true
            }
            _ => false,
        }
    }
}

/// Durable daily join quota with in-flight reservations.
///
/// All mutations run under one async mutex and commit through the shared
/// single-writer connection, so the global counter never overshoots even
/// with several workers.
pub struct QuotaLedger {
    db: Database,
    clock: Arc<dyn Clock>,
    per_account_cap: u32,
    global_cap: u32,
    counters: Mutex<Counters>,
}

impl QuotaLedger {
    /// Create a ledger with zero in-memory counts. Call [`QuotaLedger::load`] before use.
    pub fn new(config: &QuotaConfig, db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            per_account_cap: config.per_account_daily_cap,
            global_cap: config.global_daily_cap,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Create a ledger initialized from today's persisted counters.
    pub async fn from_database(
        config: &QuotaConfig,
        db: Database,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, HarvesterError> {
        let ledger = Self::new(config, db, clock);
        ledger.load().await?;
        Ok(ledger)
    }

    pub fn per_account_cap(&self) -> u32 {
        self.per_account_cap
    }

    pub fn global_cap(&self) -> u32 {
        self.global_cap
    }

    /// Re-read today's counters. Outstanding reservations are dropped.
    pub async fn load(&self) -> Result<(), HarvesterError> {
        let today = self.clock.today();
        let snapshot = self.snapshot(&today).await?;
        let mut counters = self.counters.lock().await;
        *counters = Counters {
            date: today,
            committed: snapshot.accounts.into_iter().collect(),
            committed_global: snapshot.global,
            ..Counters::default()
        };
        debug!(
            date = %counters.date,
            global = counters.committed_global,
            "quota ledger loaded"
        );
        Ok(())
    }

    /// Whether the account may join now: under its own cap and under the
    /// global cap, counting in-flight reservations.
    pub async fn check(&self, account: &str) -> bool {
        let mut counters = self.counters.lock().await;
        self.roll_date(&mut counters);
        counters.held(account) < self.per_account_cap && counters.held_global() < self.global_cap
    }

    /// Whether today's global allowance is fully committed.
    pub async fn global_exhausted(&self) -> bool {
        let mut counters = self.counters.lock().await;
        self.roll_date(&mut counters);
        counters.committed_global >= self.global_cap
    }

    /// Atomically check both caps and hold a slot for the account.
    pub async fn reserve(&self, account: &str) -> Admission {
        let mut counters = self.counters.lock().await;
        self.roll_date(&mut counters);

        if counters.held_global() >= self.global_cap {
            return Admission::GlobalCapped;
        }
        if counters.held(account) >= self.per_account_cap {
            return Admission::AccountCapped;
        }
        *counters.reserved.entry(account.to_string()).or_insert(0) += 1;
        counters.reserved_global += 1;
        Admission::Granted
    }

    /// Give back a reservation that did not end in a successful join.
    pub async fn release(&self, account: &str) {
        let mut counters = self.counters.lock().await;
        if !counters.drop_reservation(account) {
            warn!(account, "released a quota slot that was not reserved");
        }
    }

    /// Record one successful join for the account today.
    ///
    /// Increments the account and global counters in one transaction and
    /// consumes the account's reservation, if any. Returns `false` when
    /// `idempotency_key` was already committed.
    pub async fn commit(&self, account: &str, idempotency_key: &str) -> Result<bool, HarvesterError> {
        self.commit_with(account, idempotency_key, |_| Ok(())).await
    }

    /// `commit`, running `extra` inside the same transaction.
    ///
    /// The join workflow passes its audit row and group updates here so the
    /// outcome and the quota it consumes land together. If `extra` fails,
    /// nothing is written and the reservation is still held.
    pub async fn commit_with<F>(
        &self,
        account: &str,
        idempotency_key: &str,
        extra: F,
    ) -> Result<bool, HarvesterError>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<()> + Send + 'static,
    {
        let mut counters = self.counters.lock().await;
        self.roll_date(&mut counters);
        let date = counters.date.clone();

        let applied = {
            let account = account.to_string();
            let key = idempotency_key.to_string();
            let date = date.clone();
            self.db
                .connection()
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let fresh = tx.execute(
                        "INSERT OR IGNORE INTO quota_commits (key, account, date) VALUES (?1, ?2, ?3)",
                        params![key, account, date],
                    )? > 0;
                    if fresh {
                        tx.execute(
                            "INSERT INTO quota_ledger (date, account, count) VALUES (?1, ?2, 1)
                             ON CONFLICT(date, account) DO UPDATE SET count = count + 1",
                            params![date, account],
                        )?;
                        tx.execute(
                            "INSERT INTO quota_global (date, count) VALUES (?1, 1)
                             ON CONFLICT(date) DO UPDATE SET count = count + 1",
                            params![date],
                        )?;
                    }
                    extra(&tx)?;
                    tx.commit()?;
                    Ok(fresh)
                })
                .await
                .map_err(map_tr_err)?
        };

        counters.drop_reservation(account);
        if applied {
            *counters.committed.entry(account.to_string()).or_insert(0) += 1;
            counters.committed_global += 1;
            let used = counters.committed_global;
            info!(account, date = %date, global = used, "quota committed");
            if used >= self.global_cap {
                info!(cap = self.global_cap, "global daily join cap reached");
            } else if used * 5 >= self.global_cap * 4 {
                warn!(used, cap = self.global_cap, "approaching global daily join cap (80%+)");
            }
        } else {
            debug!(account, key = idempotency_key, "duplicate quota commit ignored");
        }
        Ok(applied)
    }

    /// Committed joins for the account today.
    pub async fn count(&self, account: &str) -> u32 {
        let mut counters = self.counters.lock().await;
        self.roll_date(&mut counters);
        counters.committed.get(account).copied().unwrap_or(0)
    }

    /// Committed joins across all accounts today.
    pub async fn global_count(&self) -> u32 {
        let mut counters = self.counters.lock().await;
        self.roll_date(&mut counters);
        counters.committed_global
    }

    /// Stored counters for `date` (`%Y-%m-%d`).
    pub async fn snapshot(&self, date: &str) -> Result<LedgerSnapshot, HarvesterError> {
        let date = date.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT account, count FROM quota_ledger WHERE date = ?1 ORDER BY account",
                )?;
                let accounts = stmt
                    .query_map(params![date], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
                    })?
                    .collect::<Result<BTreeMap<_, _>, _>>()?;
                let global: u32 = conn.query_row(
                    "SELECT COALESCE((SELECT count FROM quota_global WHERE date = ?1), 0)",
                    params![date],
                    |row| row.get(0),
                )?;
                Ok(LedgerSnapshot {
                    date,
                    accounts,
                    global,
                })
            })
            .await
            .map_err(map_tr_err)
    }

    /// Reconstruct every date's counters from the join audit trail.
    ///
    /// Each successful join attempt becomes one commit keyed by its attempt
    /// id. Returns the number of commits replayed.
    pub async fn rebuild(&self) -> Result<usize, HarvesterError> {
        let joined = harvester_core::JoinState::Joined.to_string();
        let replayed = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute_batch(
                    "DELETE FROM quota_commits; DELETE FROM quota_ledger; DELETE FROM quota_global;",
                )?;
                let n = tx.execute(
                    "INSERT INTO quota_commits (key, account, date)
                     SELECT id, account, substr(attempted_at, 1, 10)
                     FROM join_attempts WHERE outcome = ?1",
                    params![joined],
                )?;
                tx.execute_batch(
                    "INSERT INTO quota_ledger (date, account, count)
                         SELECT date, account, COUNT(*) FROM quota_commits GROUP BY date, account;
                     INSERT INTO quota_global (date, count)
                         SELECT date, COUNT(*) FROM quota_commits GROUP BY date;",
                )?;
                tx.commit()?;
                Ok(n)
            })
            .await
            .map_err(map_tr_err)?;

        self.load().await?;
        info!(replayed, "quota ledger rebuilt from join attempts");
        Ok(replayed)
    }

    /// Reset in-memory counts when the UTC day changes. Old rows stay as history.
    fn roll_date(&self, counters: &mut Counters) {
        let today = self.clock.today();
        if counters.date != today {
            if !counters.date.is_empty() {
                info!(from = %counters.date, to = %today, "quota day rolled over");
            }
            counters.date = today;
            counters.committed.clear();
            counters.committed_global = 0;
        }
    }
}
