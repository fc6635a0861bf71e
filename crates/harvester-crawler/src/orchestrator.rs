// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The crawl loop.
//!
//! Workers share a priority-ordered backlog of pending groups. Each iteration
//! pops a group, leases an account with a quota reservation, runs the join
//! workflow and, on membership, the scrape workflow with the same account.
//! The loop ends when the backlog drains, the global cap is reached, no
//! account can become eligible this run, or cancellation is requested.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use harvester_config::HarvesterConfig;
use harvester_core::types::AccountRecord;
use harvester_core::{
    Account, Candidate, Classifier, Clock, Group, GroupState, HarvesterError, JoinState,
    NetworkClient, Record, StorageSink, SystemClock,
};
use harvester_quota::QuotaLedger;
use harvester_sink::SinkFanout;
use harvester_storage::queries::groups;
use harvester_storage::{Database, DedupIndex};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::account_pool::{AccountPool, Selection};
use crate::join::JoinWorkflow;
use crate::rate_limiter::{DelayKind, RateLimiter};
use crate::retry::RetryPolicy;
use crate::scrape::{ScrapeReport, ScrapeWorkflow};
use crate::summary::{RunSummary, TerminationReason};

/// Backlog entry: highest priority first, then lowest insertion sequence.
#[derive(Debug)]
struct BacklogEntry(Group);

impl PartialEq for BacklogEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BacklogEntry {}

impl PartialOrd for BacklogEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BacklogEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

/// Assembles an [`Orchestrator`] from configuration and its collaborators.
pub struct OrchestratorBuilder {
    config: HarvesterConfig,
    db: Database,
    client: Option<Arc<dyn NetworkClient>>,
    clock: Arc<dyn Clock>,
    classifier: Option<Arc<dyn Classifier>>,
    sinks: Vec<Arc<dyn StorageSink>>,
}

impl OrchestratorBuilder {
    pub fn new(config: &HarvesterConfig, db: Database) -> Self {
        Self {
            config: config.clone(),
            db,
            client: None,
            clock: Arc::new(SystemClock),
            classifier: None,
            sinks: Vec::new(),
        }
    }

    pub fn client(mut self, client: Arc<dyn NetworkClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn StorageSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sinks(mut self, sinks: impl IntoIterator<Item = Arc<dyn StorageSink>>) -> Self {
        self.sinks.extend(sinks);
        self
    }

    /// Reloads durable state (quota counters, account states, pending groups)
    /// and wires the workflows together.
    pub async fn build(self) -> Result<Orchestrator, HarvesterError> {
        let client = self
            .client
            .ok_or_else(|| HarvesterError::Config("no network client configured".to_string()))?;
        let crawler = &self.config.crawler;
        let db = self.db;
        let clock = self.clock;

        let ledger = Arc::new(QuotaLedger::from_database(&self.config.quota, db.clone(), clock.clone()).await?);
        let pool = Arc::new(
            AccountPool::load(
                db.clone(),
                ledger.clone(),
                clock.clone(),
                crawler.account_selection,
                &self.config.accounts,
            )
            .await?,
        );
        let limiter = Arc::new(if crawler.simulation {
            RateLimiter::simulated(&self.config.rate_limit, clock.clone())
        } else {
            RateLimiter::new(&self.config.rate_limit, clock.clone())
        });
        let retry = RetryPolicy::from_config(&self.config.retry);
        let dedup = DedupIndex::new(db.clone());
        let sinks = Arc::new(SinkFanout::new(self.sinks));
        if sinks.is_empty() {
            warn!("no sinks enabled, harvested messages will not be exported");
        }

        let workers = crawler.workers.max(1);

        let join = JoinWorkflow {
            db: db.clone(),
            client: client.clone(),
            ledger: ledger.clone(),
            dedup: dedup.clone(),
            pool: pool.clone(),
            limiter: limiter.clone(),
            retry,
            clock: clock.clone(),
            sinks: sinks.clone(),
        };
        let scrape = ScrapeWorkflow {
            db: db.clone(),
            client,
            dedup,
            classifier: self.classifier,
            sinks: sinks.clone(),
            pool: pool.clone(),
            limiter: limiter.clone(),
            retry,
            clock: clock.clone(),
            messages_per_group: crawler.messages_per_group,
        };

        let orchestrator = Orchestrator {
            db,
            ledger,
            pool,
            limiter,
            sinks,
            clock,
            join,
            scrape,
            backlog: Mutex::new(BinaryHeap::new()),
            workers,
            scrape_joined_groups: crawler.scrape_joined_groups,
            cooldown_poll: Duration::from_secs(crawler.cooldown_poll_secs.max(1)),
        };
        orchestrator.reload_backlog().await?;
        Ok(orchestrator)
    }
}

pub struct Orchestrator {
    db: Database,
    ledger: Arc<QuotaLedger>,
    pool: Arc<AccountPool>,
    limiter: Arc<RateLimiter>,
    sinks: Arc<SinkFanout>,
    clock: Arc<dyn Clock>,
    join: JoinWorkflow,
    scrape: ScrapeWorkflow,
    backlog: Mutex<BinaryHeap<BacklogEntry>>,
    workers: usize,
    scrape_joined_groups: bool,
    cooldown_poll: Duration,
}

/// State shared by the workers of one run.
struct RunState {
    summary: Mutex<RunSummary>,
    reason: Mutex<Option<TerminationReason>>,
    /// Stops every worker once one of them decides the run is over.
    stop: CancellationToken,
}

impl RunState {
    async fn finish(&self, reason: TerminationReason) {
        let mut current = self.reason.lock().await;
        if current.is_none() {
            info!(reason = %reason, "stopping crawl");
            *current = Some(reason);
        }
        self.stop.cancel();
    }

    async fn record_scrape(&self, report: &ScrapeReport) {
        let mut summary = self.summary.lock().await;
        summary.count_scrape(report.attempt.outcome);
        summary.messages_fetched += u64::from(report.attempt.fetched);
        summary.messages_persisted += u64::from(report.attempt.persisted);
        summary.duplicates += u64::from(report.attempt.duplicates);
        summary.jobs += u64::from(report.jobs);
    }
}

impl Orchestrator {
    pub fn builder(config: &HarvesterConfig, db: Database) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config, db)
    }

    pub fn ledger(&self) -> &Arc<QuotaLedger> {
        &self.ledger
    }

    pub fn pool(&self) -> &Arc<AccountPool> {
        &self.pool
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub async fn backlog_len(&self) -> usize {
        self.backlog.lock().await.len()
    }

    /// Persists new candidates and refreshes the backlog. Returns how many were new.
    pub async fn add_candidates(&self, candidates: Vec<Candidate>) -> Result<usize, HarvesterError> {
        let inserted = groups::upsert_candidates(&self.db, candidates).await?;
        self.reload_backlog().await?;
        Ok(inserted)
    }

    async fn reload_backlog(&self) -> Result<(), HarvesterError> {
        let pending = groups::pending_groups(&self.db).await?;
        let mut backlog = self.backlog.lock().await;
        *backlog = pending.into_iter().map(BacklogEntry).collect();
        debug!(pending = backlog.len(), "backlog loaded");
        Ok(())
    }

    async fn pop(&self) -> Option<Group> {
        self.backlog.lock().await.pop().map(|entry| entry.0)
    }

    async fn push_back(&self, group: Group) {
        self.backlog.lock().await.push(BacklogEntry(group));
    }

    /// Runs the crawl until one of the termination conditions holds.
    ///
    /// Only failures of the core database are returned as errors; every
    /// network or sink failure ends up in the audit trail and the summary.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary, HarvesterError> {
        let started_at = self.clock.now();
        let previously_joined = if self.scrape_joined_groups {
            groups::joined_groups(&self.db).await?
        } else {
            Vec::new()
        };
        info!(
            workers = self.workers,
            pending = self.backlog_len().await,
            joined = previously_joined.len(),
            "crawl started"
        );

        let run = RunState {
            summary: Mutex::new(RunSummary::new(started_at)),
            reason: Mutex::new(None),
            stop: cancel.child_token(),
        };

        let results = join_all((0..self.workers).map(|id| self.worker(id, &run))).await;
        for result in results {
            result?;
        }

        if !cancel.is_cancelled() && !previously_joined.is_empty() {
            self.rescrape(previously_joined, &cancel, &run).await?;
        }

        self.snapshot_accounts().await;
        self.sinks.flush().await;

        let reason = match *run.reason.lock().await {
            Some(reason) => reason,
            None if cancel.is_cancelled() => TerminationReason::Cancelled,
            None => TerminationReason::BacklogEmpty,
        };
        let mut summary = run.summary.into_inner();
        summary.termination = reason;
        summary.finished_at = self.clock.now();
        summary.sink_failures = self
            .sinks
            .failures()
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .collect();
        summary.global_joins_today = self.ledger.global_count().await;
        info!(
            reason = %reason,
            joins = summary.total_joins(),
            persisted = summary.messages_persisted,
            global_joins_today = summary.global_joins_today,
            "crawl finished"
        );
        Ok(summary)
    }

    async fn worker(&self, id: usize, run: &RunState) -> Result<(), HarvesterError> {
        let result = self.work(id, run).await;
        if let Err(e) = &result {
            warn!(worker = id, error = %e, "worker stopped on storage failure");
            run.stop.cancel();
        }
        result
    }

    async fn work(&self, id: usize, run: &RunState) -> Result<(), HarvesterError> {
        loop {
            if run.stop.is_cancelled() {
                return Ok(());
            }
            if self.ledger.global_exhausted().await {
                run.finish(TerminationReason::GlobalCapReached).await;
                return Ok(());
            }
            let Some(group) = self.pop().await else {
                debug!(worker = id, "backlog empty");
                return Ok(());
            };

            // The operator may have blacklisted it since the backlog was loaded.
            match groups::get_group(&self.db, &group.id).await? {
                Some(current) if current.state == GroupState::Pending => {}
                _ => {
                    debug!(worker = id, group = %group.id, "group no longer pending");
                    continue;
                }
            }

            let account = match self.pool.select().await? {
                Selection::Account(account) => account,
                Selection::Busy => {
                    self.push_back(group).await;
                    self.pause(&run.stop, self.cooldown_poll).await;
                    continue;
                }
                Selection::CoolingDown(resume_at) => {
                    self.push_back(group).await;
                    let wait = (resume_at - self.clock.now()).to_std().unwrap_or_default();
                    info!(worker = id, resume_at = %resume_at, "all accounts cooling down, waiting");
                    self.pause(&run.stop, wait).await;
                    continue;
                }
                Selection::Exhausted { disabled, capped } => {
                    self.push_back(group).await;
                    let reason = if self.ledger.global_exhausted().await {
                        TerminationReason::GlobalCapReached
                    } else {
                        exhaustion_reason(disabled, capped)
                    };
                    run.finish(reason).await;
                    return Ok(());
                }
            };

            let result = self.attempt(&group, &account, run).await;
            self.pool.release(&account.name).await;
            result?;
        }
    }

    async fn attempt(&self, group: &Group, account: &Account, run: &RunState) -> Result<(), HarvesterError> {
        let attempt = self.join.run(group, account).await?;
        run.summary.lock().await.count_join(attempt.outcome);

        if attempt.outcome.is_member() {
            let report = self.scrape.run(group, account).await?;
            run.record_scrape(&report).await;
        } else if attempt.outcome == JoinState::Unauthorized {
            // Another account may still join it.
            self.push_back(group.clone()).await;
        }
        Ok(())
    }

    /// Scrapes groups joined in earlier runs with the account holding each membership.
    async fn rescrape(
        &self,
        joined: Vec<Group>,
        cancel: &CancellationToken,
        run: &RunState,
    ) -> Result<(), HarvesterError> {
        for group in joined {
            if cancel.is_cancelled() {
                break;
            }
            let Some(holder) = group.joined_by.as_deref() else {
                continue;
            };
            let Some(account) = self.pool.lease_named(holder).await? else {
                info!(group = %group.id, account = holder, "membership holder unavailable, skipping re-scrape");
                continue;
            };
            self.limiter.delay(DelayKind::Generic).await;
            let result = self.scrape.run(&group, &account).await;
            self.pool.release(&account.name).await;
            let report = result?;
            run.record_scrape(&report).await;
            run.summary.lock().await.rescraped_groups += 1;
        }
        Ok(())
    }

    async fn snapshot_accounts(&self) {
        let now = self.clock.now();
        for account in self.pool.snapshot().await {
            let record = Record::Account(AccountRecord {
                joins_today: self.ledger.count(&account.name).await,
                name: account.name,
                phone: account.phone,
                state: account.state.as_str().to_string(),
                resume_at: account.state.resume_at(),
                recorded_at: now,
            });
            self.sinks.append(&record).await;
        }
    }

    async fn pause(&self, stop: &CancellationToken, duration: Duration) {
        tokio::select! {
            _ = stop.cancelled() => {}
            _ = self.clock.sleep(duration) => {}
        }
    }
}

fn exhaustion_reason(disabled: usize, capped: usize) -> TerminationReason {
    match (disabled, capped) {
        (0, 0) => TerminationReason::AccountsUnavailable,
        (0, _) => TerminationReason::AccountQuotaExhausted,
        (_, 0) => TerminationReason::AccountsDisabled,
        _ => TerminationReason::AccountsUnavailable,
    }
}
