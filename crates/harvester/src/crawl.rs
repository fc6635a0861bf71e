// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `harvester run` command implementation.
//!
//! Opens the database, seeds the backlog from the candidate file, picks the
//! real bridge client or the simulation stub, and drives the orchestrator
//! until it stops. Cancelled by SIGINT/SIGTERM after in-flight work finishes.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use harvester_bridge::BridgeClient;
use harvester_classify::KeywordClassifier;
use harvester_config::model::AccountConfig;
use harvester_config::{ConfigError, HarvesterConfig};
use harvester_core::{Candidate, Clock, HarvesterError, NetworkClient, SystemClock};
use harvester_crawler::{Orchestrator, RunSummary, install_signal_handler};
use harvester_sim::{ManualClock, SimulationStub};
use harvester_storage::Database;
use tracing::{info, warn};

/// Reads the candidate file. A missing default file only means the
/// backlog already in the database is resumed.
pub fn load_backlog(
    config: &HarvesterConfig,
    override_path: Option<&Path>,
) -> Result<Vec<Candidate>, ConfigError> {
    let path = override_path.unwrap_or_else(|| Path::new(&config.crawler.candidate_source));
    let filter = config.crawler.category_filter.as_deref();
    if override_path.is_none()
        && matches!(std::fs::metadata(path), Err(e) if e.kind() == ErrorKind::NotFound)
    {
        warn!(path = %path.display(), "candidate file not found, resuming stored backlog");
        return Ok(Vec::new());
    }
    harvester_config::load_candidates(path, filter)
}

pub async fn run_crawl(
    mut config: HarvesterConfig,
    candidates: Vec<Candidate>,
) -> Result<RunSummary, HarvesterError> {
    let simulation = config.crawler.simulation;
    info!(simulation, "starting harvester run");

    if simulation && config.accounts.is_empty() {
        config.accounts = simulated_accounts(&config);
        info!(accounts = config.accounts.len(), "using generated simulation accounts");
    }

    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;

    let (client, clock): (Arc<dyn NetworkClient>, Arc<dyn Clock>) = if simulation {
        (
            Arc::new(SimulationStub::from_config(&config.simulation)),
            Arc::new(ManualClock::starting_at(Utc::now())),
        )
    } else {
        (
            Arc::new(BridgeClient::from_config(&config.network, &config.accounts)?),
            Arc::new(SystemClock),
        )
    };

    let mut builder = Orchestrator::builder(&config, db.clone())
        .client(client)
        .clock(clock)
        .sinks(harvester_sink::sinks_from_config(&config.sinks)?);
    if config.classifier.enabled {
        builder = builder.classifier(Arc::new(KeywordClassifier::from_config(&config.classifier)));
    }
    let orchestrator = builder.build().await?;

    if !candidates.is_empty() {
        let added = orchestrator.add_candidates(candidates).await?;
        info!(added, pending = orchestrator.backlog_len().await, "backlog seeded");
    }

    let cancel = install_signal_handler();
    let summary = orchestrator.run(cancel).await?;
    drop(orchestrator);
    db.close().await?;
    Ok(summary)
}

/// Enough synthetic accounts for the global cap to be reachable.
fn simulated_accounts(config: &HarvesterConfig) -> Vec<AccountConfig> {
    let per_account = config.quota.per_account_daily_cap.max(1);
    let count = config.quota.global_daily_cap.div_ceil(per_account).max(1);
    (1..=count)
        .map(|i| AccountConfig {
            name: format!("sim-{i}"),
            phone: format!("+0000000{i:04}"),
            api_id: 0,
            api_hash: String::new(),
            session: None,
        })
        .collect()
}

pub fn print_summary(summary: &RunSummary, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print!("{summary}");
    }
}
