// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `harvester status` command implementation.
//!
//! Reads today's quota counters, account lifecycle states and backlog size
//! straight from the database. Works whether or not a run is in progress.

use std::io::IsTerminal;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use harvester_config::HarvesterConfig;
use harvester_core::{AccountState, Clock, HarvesterError, SystemClock};
use harvester_quota::QuotaLedger;
use harvester_storage::Database;
use harvester_storage::queries::{accounts, audit, groups};
use serde::Serialize;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub date: String,
    pub global_joins: u32,
    pub global_cap: u32,
    pub per_account_cap: u32,
    pub accounts: Vec<AccountStatus>,
    pub pending_groups: u64,
    pub joined_groups: u64,
    pub blacklisted_groups: u64,
    /// Join attempts recorded today, per outcome.
    pub join_outcomes: Vec<(String, u64)>,
}

#[derive(Debug, Serialize)]
pub struct AccountStatus {
    pub name: String,
    pub state: String,
    pub resume_at: Option<DateTime<Utc>>,
    pub joins_today: u32,
}

pub async fn run_status(config: &HarvesterConfig, json: bool, plain: bool) -> Result<(), HarvesterError> {
    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
    let report = collect(config, &db).await?;
    db.close().await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_report(&report, use_color);
    }
    Ok(())
}

async fn collect(config: &HarvesterConfig, db: &Database) -> Result<StatusReport, HarvesterError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let date = clock.today();
    let ledger = QuotaLedger::new(&config.quota, db.clone(), clock);
    let snapshot = ledger.snapshot(&date).await?;
    let counts = groups::group_counts(db).await?;

    let accounts = accounts::list_accounts(db)
        .await?
        .into_iter()
        .map(|row| AccountStatus {
            joins_today: snapshot.accounts.get(&row.name).copied().unwrap_or(0),
            state: row.state.as_str().to_string(),
            resume_at: row.state.resume_at(),
            name: row.name,
        })
        .collect();

    Ok(StatusReport {
        global_joins: snapshot.global,
        global_cap: ledger.global_cap(),
        per_account_cap: ledger.per_account_cap(),
        accounts,
        pending_groups: counts.pending,
        joined_groups: counts.joined,
        blacklisted_groups: counts.blacklisted,
        join_outcomes: audit::join_outcome_counts(db, &date)
            .await?
            .into_iter()
            .map(|(outcome, n)| (outcome.to_string(), n))
            .collect(),
        date,
    })
}

fn print_report(report: &StatusReport, use_color: bool) {
    use colored::Colorize;

    println!();
    println!("  harvester status ({})", report.date);
    println!("  {}", "-".repeat(35));
    println!(
        "    Quota:    {}/{} joins today (per account {})",
        report.global_joins, report.global_cap, report.per_account_cap
    );
    println!(
        "    Groups:   {} pending, {} joined, {} blacklisted",
        report.pending_groups, report.joined_groups, report.blacklisted_groups
    );
    for (outcome, n) in &report.join_outcomes {
        println!("              {outcome}: {n}");
    }
    println!();
    println!("  accounts");
    for account in &report.accounts {
        let state = match (&account.resume_at, account.state.as_str()) {
            (Some(resume_at), _) => format!("cooldown until {}", resume_at.format("%H:%M:%S UTC")),
            (None, other) => other.to_string(),
        };
        let state = if !use_color {
            format!("[{state}]")
        } else if account.state == AccountState::Disabled.as_str() {
            state.red().to_string()
        } else if account.resume_at.is_some() {
            state.yellow().to_string()
        } else {
            state.green().to_string()
        };
        println!(
            "    {:<16} {:>3}/{} {}",
            account.name, account.joins_today, report.per_account_cap, state
        );
    }
    if report.accounts.iter().any(|a| a.state == AccountState::Disabled.as_str()) {
        println!();
        println!("  Clear disabled accounts with: harvester reinstate <account>");
    }
    println!();
}
