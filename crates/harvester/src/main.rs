// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Harvester - a quota-aware crawler that joins messaging groups and
//! harvests their messages.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;
mod crawl;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use harvester_config::HarvesterConfig;

/// Harvester - joins messaging groups and harvests their messages.
#[derive(Parser, Debug)]
#[command(name = "harvester", version, about, long_about = None)]
struct Cli {
    /// Configuration file to load instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Join pending groups and scrape them until the backlog, quota or accounts run out.
    Run {
        /// Candidate JSON file (defaults to `crawler.candidate_source`).
        #[arg(long)]
        candidates: Option<PathBuf>,
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show today's quota usage, account states and backlog size.
    Status {
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Return a Disabled or cooling-down account to Idle.
    Reinstate { account: String },
    /// Permanently blacklist a group so it is never attempted.
    Blacklist { group: String },
    /// Rebuild quota counters and the joined-group set from the join audit trail.
    RebuildLedger,
    /// Print the effective configuration with secrets redacted.
    Config,
}

/// Exit code of a run that stopped because accounts need an operator.
const EXIT_NEEDS_INTERVENTION: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => harvester_config::load_and_validate_path(path),
        None => harvester_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            harvester_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.crawler.log_level);

    let result = match cli.command {
        Some(Commands::Run { candidates, json }) => {
            let candidates = match crawl::load_backlog(&config, candidates.as_deref()) {
                Ok(candidates) => candidates,
                Err(error) => {
                    harvester_config::render_errors(&[error]);
                    std::process::exit(1);
                }
            };
            match crawl::run_crawl(config, candidates).await {
                Ok(summary) => {
                    crawl::print_summary(&summary, json);
                    if summary.termination.needs_intervention() {
                        std::process::exit(EXIT_NEEDS_INTERVENTION);
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        Some(Commands::Status { json, plain }) => status::run_status(&config, json, plain).await,
        Some(Commands::Reinstate { account }) => admin::reinstate(&config, &account).await,
        Some(Commands::Blacklist { group }) => admin::blacklist(&config, &group).await,
        Some(Commands::RebuildLedger) => admin::rebuild_ledger(&config).await,
        Some(Commands::Config) => {
            print_config(&config);
            Ok(())
        }
        None => {
            println!("harvester: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("harvester={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

fn print_config(config: &HarvesterConfig) {
    match toml::to_string_pretty(&redacted(config)) {
        Ok(text) => print!("{text}"),
        Err(e) => eprintln!("error: cannot render configuration: {e}"),
    }
}

const REDACTED: &str = "<redacted>";

/// Copy of the configuration with credentials masked.
fn redacted(config: &HarvesterConfig) -> HarvesterConfig {
    let mut config = config.clone();
    for account in &mut config.accounts {
        if !account.api_hash.is_empty() {
            account.api_hash = REDACTED.to_string();
        }
        if account.session.is_some() {
            account.session = Some(REDACTED.to_string());
        }
    }
    if config.sinks.search_index.password.is_some() {
        config.sinks.search_index.password = Some(REDACTED.to_string());
    }
    config
}
