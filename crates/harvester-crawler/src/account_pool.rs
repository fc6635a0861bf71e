// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Selection of the account that performs the next join.
//!
//! An account is eligible when it is Idle or Active (or in a Cooldown that
//! has expired) and the quota ledger grants it a slot. A selected account is
//! leased to one worker and carries a quota reservation until the join
//! workflow commits or releases it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use harvester_config::model::{AccountConfig, AccountSelection};
use harvester_core::types::Credentials;
use harvester_core::{Account, AccountState, Clock, HarvesterError};
use harvester_quota::{Admission, QuotaLedger};
use harvester_storage::Database;
use harvester_storage::queries::accounts;
use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of asking the pool for an account.
#[derive(Debug, Clone)]
pub enum Selection {
    /// Leased, with one quota slot reserved.
    Account(Account),
    /// Every otherwise eligible account is leased to another worker.
    Busy,
    /// Nothing is eligible now; the earliest cooldown ends at this instant.
    CoolingDown(DateTime<Utc>),
    /// Nothing is eligible and nothing will become eligible this run.
    Exhausted { disabled: usize, capped: usize },
}

/// Accounts compare by name and state; credentials are never compared.
impl PartialEq for Selection {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Selection::Account(a), Selection::Account(b)) => a.name == b.name && a.state == b.state,
            (Selection::Busy, Selection::Busy) => true,
            (Selection::CoolingDown(a), Selection::CoolingDown(b)) => a == b,
            (
                Selection::Exhausted { disabled, capped },
                Selection::Exhausted {
                    disabled: other_disabled,
                    capped: other_capped,
                },
            ) => disabled == other_disabled && capped == other_capped,
            _ => false,
        }
    }
}

/// Longest cooldown honoured from a flood wait.
const MAX_COOLDOWN_SECS: u64 = 366 * 24 * 3600;

struct PoolState {
    /// Configuration order.
    accounts: Vec<Account>,
    leased: HashSet<String>,
    /// Round-robin position: index of the next account to consider first.
    next: usize,
}

pub struct AccountPool {
    db: Database,
    ledger: Arc<QuotaLedger>,
    clock: Arc<dyn Clock>,
    policy: AccountSelection,
    state: Mutex<PoolState>,
}

impl AccountPool {
    /// Registers every configured account and restores its persisted state.
    ///
    /// Configuration never resets a Disabled or cooling-down account.
    pub async fn load(
        db: Database,
        ledger: Arc<QuotaLedger>,
        clock: Arc<dyn Clock>,
        policy: AccountSelection,
        configs: &[AccountConfig],
    ) -> Result<Self, HarvesterError> {
        let mut loaded = Vec::with_capacity(configs.len());
        for config in configs {
            accounts::register_account(&db, &config.name, &config.phone).await?;
            let state = accounts::get_account(&db, &config.name)
                .await?
                .map(|row| row.state)
                .unwrap_or(AccountState::Idle);
            if state == AccountState::Disabled {
                warn!(account = %config.name, "account is disabled; run `harvester reinstate` to clear");
            }
            loaded.push(account_from_config(config, state));
        }
        info!(accounts = loaded.len(), policy = %policy, "account pool loaded");

        Ok(Self {
            db,
            ledger,
            clock,
            policy,
            state: Mutex::new(PoolState {
                accounts: loaded,
                leased: HashSet::new(),
                next: 0,
            }),
        })
    }

    /// The next eligible account, or `None` when nothing is eligible.
    pub async fn next_account(&self) -> Result<Option<Account>, HarvesterError> {
        Ok(match self.select().await? {
            Selection::Account(account) => Some(account),
            _ => None,
        })
    }

    /// Leases an eligible account and reserves one quota slot for it.
    pub async fn select(&self) -> Result<Selection, HarvesterError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let order = self.candidate_order(&state).await;

        let mut busy = false;
        let mut disabled = 0;
        let mut capped = 0;
        let mut earliest: Option<DateTime<Utc>> = None;

        for index in order {
            let name = state.accounts[index].name.clone();
            match state.accounts[index].state {
                AccountState::Disabled => {
                    disabled += 1;
                    continue;
                }
                AccountState::Cooldown { resume_at } if resume_at > now => {
                    earliest = Some(earliest.map_or(resume_at, |e| e.min(resume_at)));
                    continue;
                }
                AccountState::Cooldown { .. } => {
                    info!(account = %name, "cooldown expired");
                    self.transition(&mut state.accounts[index], AccountState::Idle, now)
                        .await?;
                }
                AccountState::Idle | AccountState::Active => {}
            }

            if state.leased.contains(&name) {
                busy = true;
                continue;
            }

            match self.ledger.reserve(&name).await {
                Admission::Granted => {
                    self.transition(&mut state.accounts[index], AccountState::Active, now)
                        .await?;
                    state.leased.insert(name.clone());
                    state.next = (index + 1) % state.accounts.len();
                    debug!(account = %name, "account leased");
                    return Ok(Selection::Account(state.accounts[index].clone()));
                }
                Admission::AccountCapped => capped += 1,
                // Other workers' reservations may still be released.
                Admission::GlobalCapped if !self.ledger.global_exhausted().await => busy = true,
                Admission::GlobalCapped => capped += 1,
            }
        }

        Ok(if busy {
            Selection::Busy
        } else if let Some(resume_at) = earliest {
            Selection::CoolingDown(resume_at)
        } else {
            Selection::Exhausted { disabled, capped }
        })
    }

    /// Leases a specific account without reserving quota, for scraping
    /// groups it already belongs to. `None` if it is unknown, leased,
    /// disabled, or still cooling down.
    pub async fn lease_named(&self, name: &str) -> Result<Option<Account>, HarvesterError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let Some(index) = state.accounts.iter().position(|a| a.name == name) else {
            return Ok(None);
        };
        if state.leased.contains(name) {
            return Ok(None);
        }
        match state.accounts[index].state {
            AccountState::Disabled => return Ok(None),
            AccountState::Cooldown { resume_at } if resume_at > now => return Ok(None),
            _ => {}
        }
        self.transition(&mut state.accounts[index], AccountState::Active, now)
            .await?;
        state.leased.insert(name.to_string());
        Ok(Some(state.accounts[index].clone()))
    }

    /// Ends a lease. Quota reservations are handled by the join workflow.
    pub async fn release(&self, name: &str) {
        self.state.lock().await.leased.remove(name);
    }

    /// Puts the account into Cooldown for `seconds` and returns when it ends.
    pub async fn cooldown(&self, name: &str, seconds: u64) -> Result<DateTime<Utc>, HarvesterError> {
        let now = self.clock.now();
        let resume_at = now + ChronoDuration::seconds(seconds.min(MAX_COOLDOWN_SECS) as i64);
        self.set_state(name, AccountState::Cooldown { resume_at }, now).await?;
        warn!(account = name, seconds, resume_at = %resume_at, "account cooling down after flood wait");
        Ok(resume_at)
    }

    /// Disables the account until an operator reinstates it.
    pub async fn disable(&self, name: &str) -> Result<(), HarvesterError> {
        let now = self.clock.now();
        self.set_state(name, AccountState::Disabled, now).await?;
        warn!(account = name, "account disabled: session rejected, manual intervention required");
        Ok(())
    }

    /// Current accounts and their states, in configuration order.
    pub async fn snapshot(&self) -> Vec<Account> {
        self.state.lock().await.accounts.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.accounts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn set_state(&self, name: &str, next: AccountState, now: DateTime<Utc>) -> Result<(), HarvesterError> {
        let mut state = self.state.lock().await;
        match state.accounts.iter_mut().find(|a| a.name == name) {
            Some(account) => self.transition(account, next, now).await,
            None => Err(HarvesterError::Internal(format!("unknown account {name}"))),
        }
    }

    async fn transition(
        &self,
        account: &mut Account,
        next: AccountState,
        now: DateTime<Utc>,
    ) -> Result<(), HarvesterError> {
        if account.state == next {
            return Ok(());
        }
        accounts::set_account_state(&self.db, &account.name, &next, now).await?;
        debug!(account = %account.name, from = account.state.as_str(), to = next.as_str(), "account state changed");
        account.state = next;
        Ok(())
    }

    /// Indices in the order the selection policy considers them.
    async fn candidate_order(&self, state: &PoolState) -> Vec<usize> {
        let n = state.accounts.len();
        match self.policy {
            AccountSelection::RoundRobin => (0..n).map(|i| (state.next + i) % n).collect(),
            AccountSelection::LeastLoaded => {
                let mut loads = Vec::with_capacity(n);
                for (i, account) in state.accounts.iter().enumerate() {
                    loads.push((self.ledger.count(&account.name).await, i));
                }
                loads.sort();
                loads.into_iter().map(|(_, i)| i).collect()
            }
        }
    }
}

/// Builds a runtime account from its configuration entry.
pub fn account_from_config(config: &AccountConfig, state: AccountState) -> Account {
    Account {
        name: config.name.clone(),
        phone: config.phone.clone(),
        credentials: Arc::new(Credentials {
            api_id: config.api_id,
            api_hash: SecretString::from(config.api_hash.clone()),
            session: config.session.clone().map(SecretString::from),
        }),
        state,
    }
}
