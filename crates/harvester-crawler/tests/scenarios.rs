// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end crawl scenarios driven through the orchestrator.
//!
//! Each test runs against the simulation stub, a manual clock, in-memory
//! sinks and a temp SQLite database. "Restarts" build a fresh orchestrator
//! over the same database file.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use harvester_classify::KeywordClassifier;
use harvester_config::HarvesterConfig;
use harvester_config::model::{AccountConfig, QuotaConfig};
use harvester_core::{
    AccountState, Candidate, Clock, GroupId, GroupState, JoinOutcome, JoinState, RecordKind,
    ScrapeState, StorageSink,
};
use harvester_crawler::{Orchestrator, RunSummary, Selection, TerminationReason};
use harvester_sim::{FetchScript, JoinScript, ManualClock, MemorySink, SimulationStub, StubCall};
use harvester_storage::{Claim, Database, DedupIndex, DedupKey};
use harvester_storage::queries::{audit, groups};
use tokio_util::sync::CancellationToken;

struct Harness {
    orchestrator: Orchestrator,
    stub: Arc<SimulationStub>,
    clock: Arc<ManualClock>,
    db: Database,
}

fn config(accounts: &[&str], per_account: u32, global: u32) -> HarvesterConfig {
    let mut config = HarvesterConfig::default();
    config.crawler.simulation = true;
    config.crawler.messages_per_group = 10;
    config.quota = QuotaConfig {
        per_account_daily_cap: per_account,
        global_daily_cap: global,
    };
    config.accounts = accounts
        .iter()
        .enumerate()
        .map(|(i, name)| AccountConfig {
            name: name.to_string(),
            phone: format!("+1555000{i}"),
            api_id: 1000 + i as i64,
            api_hash: format!("hash-{name}"),
            session: None,
        })
        .collect();
    config
}

fn reference(i: usize) -> String {
    format!("https://t.me/group{i:02}")
}

fn candidates(n: usize) -> Vec<Candidate> {
    (1..=n)
        .map(|i| Candidate {
            reference: reference(i),
            category: "jobs".to_string(),
            priority: 1,
        })
        .collect()
}

async fn harness(
    config: &HarvesterConfig,
    dir: &Path,
    stub: Arc<SimulationStub>,
    sinks: Vec<Arc<MemorySink>>,
    groups: usize,
) -> Harness {
    let db = Database::open(dir.join("harvester.db").to_str().unwrap())
        .await
        .unwrap();
    let clock = Arc::new(ManualClock::default());
    let orchestrator = Orchestrator::builder(config, db.clone())
        .client(stub.clone())
        .clock(clock.clone())
        .classifier(Arc::new(KeywordClassifier::new()))
        .sinks(sinks.into_iter().map(|s| s as Arc<dyn StorageSink>))
        .build()
        .await
        .unwrap();
    orchestrator.add_candidates(candidates(groups)).await.unwrap();
    Harness {
        orchestrator,
        stub,
        clock,
        db,
    }
}

async fn run(harness: &Harness) -> RunSummary {
    harness
        .orchestrator
        .run(CancellationToken::new())
        .await
        .unwrap()
}

fn joins_by(calls: &[StubCall]) -> Vec<(String, String)> {
    calls
        .iter()
        .filter_map(|call| match call {
            StubCall::Join { account, group } => Some((account.clone(), group.clone())),
            StubCall::Fetch { .. } => None,
        })
        .collect()
}

// ---- Scenario A: quota caps bound the crawl ----

#[tokio::test]
async fn caps_stop_the_crawl_at_the_global_limit() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["alpha", "beta"], 5, 8);
    let h = harness(&config, dir.path(), Arc::new(SimulationStub::new(1)), vec![], 10).await;

    let summary = run(&h).await;

    assert_eq!(summary.termination, TerminationReason::GlobalCapReached);
    assert_eq!(summary.joins_in(JoinState::Joined), 8);
    assert_eq!(h.stub.join_calls(), 8);

    let snapshot = h
        .orchestrator
        .ledger()
        .snapshot(&h.clock.today())
        .await
        .unwrap();
    assert_eq!(snapshot.global, 8);
    assert_eq!(snapshot.account_sum(), 8);
    assert!(snapshot.accounts.values().all(|n| *n <= 5));

    let counts = groups::group_counts(&h.db).await.unwrap();
    assert_eq!(counts.joined, 8);
    assert_eq!(counts.pending, 2);
}

#[tokio::test]
async fn concurrent_workers_respect_caps_and_join_each_group_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&["alpha", "beta"], 5, 8);
    config.crawler.workers = 4;
    let h = harness(&config, dir.path(), Arc::new(SimulationStub::new(2)), vec![], 10).await;

    let summary = run(&h).await;

    assert_eq!(summary.termination, TerminationReason::GlobalCapReached);
    assert_eq!(summary.joins_in(JoinState::Joined), 8);
    assert_eq!(h.stub.join_calls(), 8);

    let joins = joins_by(&h.stub.calls().await);
    let unique: HashSet<_> = joins.iter().map(|(_, group)| group.clone()).collect();
    assert_eq!(unique.len(), 8);

    let snapshot = h
        .orchestrator
        .ledger()
        .snapshot(&h.clock.today())
        .await
        .unwrap();
    assert_eq!(snapshot.global, 8);
    assert!(snapshot.accounts.values().all(|n| *n <= 5));

    let counts = groups::group_counts(&h.db).await.unwrap();
    assert_eq!(counts.joined, 8);
    assert_eq!(counts.pending, 2);
}

#[tokio::test]
async fn per_account_caps_end_the_run_as_quota_exhaustion() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["alpha", "beta"], 2, 40);
    let h = harness(&config, dir.path(), Arc::new(SimulationStub::new(1)), vec![], 10).await;

    let summary = run(&h).await;

    assert_eq!(summary.termination, TerminationReason::AccountQuotaExhausted);
    assert!(!summary.termination.needs_intervention());
    assert_eq!(summary.joins_in(JoinState::Joined), 4);
    assert_eq!(summary.global_joins_today, 4);
}

// ---- Scenario B: flood wait cools an account down ----

#[tokio::test]
async fn flood_wait_routes_joins_to_the_other_account() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["alpha", "beta"], 10, 40);
    let stub = Arc::new(SimulationStub::new(3));
    stub.script_account_join("alpha", 3, JoinScript::Outcome(JoinOutcome::FloodWait { seconds: 600 }))
        .await;
    let h = harness(&config, dir.path(), stub, vec![], 8).await;
    let started = h.clock.now();

    let summary = run(&h).await;
    assert_eq!(summary.termination, TerminationReason::BacklogEmpty);
    assert_eq!(summary.joins_in(JoinState::FloodWaited), 1);
    assert_eq!(summary.joins_in(JoinState::Joined), 7);

    // Round robin until alpha's third join, beta only afterwards.
    let joins = joins_by(&h.stub.calls().await);
    let flood_at = joins
        .iter()
        .enumerate()
        .filter(|(_, (account, _))| account == "alpha")
        .nth(2)
        .map(|(i, _)| i)
        .unwrap();
    assert_eq!(flood_at, 4);
    assert!(joins[flood_at + 1..].iter().all(|(account, _)| account == "beta"));

    // The flood-waited group stays pending for the next run.
    let flooded = groups::get_group(&h.db, &GroupId::from_reference(&joins[flood_at].1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(flooded.state, GroupState::Pending);

    let pool = h.orchestrator.pool();
    let alpha = pool
        .snapshot()
        .await
        .into_iter()
        .find(|a| a.name == "alpha")
        .unwrap();
    let AccountState::Cooldown { resume_at } = alpha.state else {
        panic!("alpha should be cooling down, was {:?}", alpha.state);
    };
    assert_eq!(resume_at, started + chrono::Duration::seconds(600));

    // Just before the wait ends only beta is selectable.
    h.clock.set(resume_at - chrono::Duration::seconds(1));
    for _ in 0..2 {
        match pool.select().await.unwrap() {
            Selection::Account(account) => {
                assert_eq!(account.name, "beta");
                pool.release(&account.name).await;
                h.orchestrator.ledger().release(&account.name).await;
            }
            other => panic!("expected beta, got {other:?}"),
        }
    }

    // At the resume time alpha is eligible again.
    h.clock.set(resume_at);
    let mut names = Vec::new();
    for _ in 0..2 {
        if let Selection::Account(account) = pool.select().await.unwrap() {
            names.push(account.name.clone());
            pool.release(&account.name).await;
            h.orchestrator.ledger().release(&account.name).await;
        }
    }
    assert!(names.contains(&"alpha".to_string()));
}

#[tokio::test]
async fn run_waits_out_a_cooldown_when_no_account_is_eligible() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["solo"], 10, 40);
    let stub = Arc::new(SimulationStub::new(4));
    stub.script_account_join("solo", 1, JoinScript::Outcome(JoinOutcome::FloodWait { seconds: 900 }))
        .await;
    let h = harness(&config, dir.path(), stub, vec![], 2).await;
    let started = h.clock.now();

    let summary = run(&h).await;

    assert_eq!(summary.joins_in(JoinState::FloodWaited), 1);
    assert_eq!(summary.joins_in(JoinState::Joined), 1);
    assert!(h.clock.now() >= started + chrono::Duration::seconds(900));
}

// ---- Scenario C: scrape idempotence across cursor advances ----

#[tokio::test]
async fn second_scrape_persists_only_new_messages() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["alpha"], 10, 40);
    let sink = Arc::new(MemorySink::new("structured"));
    let group = reference(1);
    let m = |id| SimulationStub::message(id, "hiring python developer, remote, apply @acme_hr");

    let stub = Arc::new(SimulationStub::new(5));
    stub.script_fetch(&group, FetchScript::Batch(vec![m(3), m(1), m(2)]))
        .await;
    let first = harness(&config, dir.path(), stub, vec![sink.clone()], 1).await;
    let summary = run(&first).await;
    assert_eq!(summary.messages_persisted, 3);
    let stored = groups::get_group(&first.db, &GroupId::from_reference(&group))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.cursor, Some(3));
    first.db.close().await.unwrap();

    // Restart: the joined group is re-scraped by the account that joined it.
    let stub = Arc::new(SimulationStub::new(5));
    stub.script_fetch(&group, FetchScript::Batch(vec![m(2), m(3), m(4)]))
        .await;
    let second = harness(&config, dir.path(), stub, vec![sink.clone()], 1).await;
    let summary = run(&second).await;

    assert_eq!(second.stub.join_calls(), 0);
    assert_eq!(summary.rescraped_groups, 1);
    assert_eq!(summary.messages_persisted, 1);
    assert_eq!(summary.duplicates, 2);
    match second.stub.calls().await.as_slice() {
        [StubCall::Fetch { account, cursor, .. }] => {
            assert_eq!(account, "alpha");
            assert_eq!(*cursor, Some(3));
        }
        other => panic!("expected one fetch, got {other:?}"),
    }

    let ids: Vec<i64> = sink.message_keys().await.into_iter().map(|(_, id)| id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(
        audit::scrape_attempt_count(&second.db, &GroupId::from_reference(&group))
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn claim_abandoned_by_a_crashed_run_is_scraped_again() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["alpha"], 10, 40);
    let sink = Arc::new(MemorySink::new("structured"));
    let group = reference(1);
    let m = |id| SimulationStub::message(id, "hiring rust engineer, remote, apply @acme_hr");

    let stub = Arc::new(SimulationStub::new(6));
    stub.script_fetch(&group, FetchScript::Batch(vec![m(1), m(2), m(3)]))
        .await;
    let h = harness(&config, dir.path(), stub, vec![sink.clone()], 1).await;

    // A previous run claimed message 2 and died before any sink stored it.
    let key = DedupKey::Message(GroupId::from_reference(&group), 2);
    let crashed = DedupIndex::new(h.db.clone());
    assert_eq!(crashed.claim(&key).await.unwrap(), Claim::Claimed);

    let summary = run(&h).await;

    assert_eq!(summary.messages_persisted, 3);
    assert_eq!(summary.duplicates, 0);
    let ids: Vec<i64> = sink.message_keys().await.into_iter().map(|(_, id)| id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    let stored = groups::get_group(&h.db, &GroupId::from_reference(&group))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.cursor, Some(3));
    assert_eq!(crashed.claim(&key).await.unwrap(), Claim::Duplicate);
}

#[tokio::test]
async fn repeated_runs_never_duplicate_a_message() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["alpha", "beta"], 10, 40);
    let sink = Arc::new(MemorySink::new("structured"));

    for seed in [11, 12, 13] {
        let h = harness(
            &config,
            dir.path(),
            Arc::new(SimulationStub::new(seed)),
            vec![sink.clone()],
            4,
        )
        .await;
        run(&h).await;
        h.db.close().await.unwrap();
    }

    let keys = sink.message_keys().await;
    let unique: HashSet<_> = keys.iter().cloned().collect();
    assert!(!keys.is_empty());
    assert_eq!(unique.len(), keys.len());
}

#[tokio::test]
async fn job_postings_are_derived_from_classified_messages() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["alpha"], 10, 40);
    let sink = Arc::new(MemorySink::new("structured"));
    let stub = Arc::new(SimulationStub::new(6));
    stub.script_fetch(
        &reference(1),
        FetchScript::Batch(vec![
            SimulationStub::message(
                1,
                "We are hiring a junior Python developer. Remote, salary 6 LPA. \
                 Apply via jobs@acme.io, based in Bangalore.",
            ),
            SimulationStub::message(2, "good morning everyone"),
            SimulationStub::message(3, ""),
        ]),
    )
    .await;
    let h = harness(&config, dir.path(), stub, vec![sink.clone()], 1).await;

    let summary = run(&h).await;

    assert_eq!(summary.messages_persisted, 3);
    assert_eq!(summary.jobs, 1);
    assert_eq!(sink.records_of(RecordKind::Job).await.len(), 1);
    assert_eq!(sink.records_of(RecordKind::Group).await.len(), 1);
    // Accounts are snapshotted at the end of every run.
    assert_eq!(sink.records_of(RecordKind::Account).await.len(), 1);
}

// ---- Scenario D: one failing sink does not block the others ----

#[tokio::test]
async fn failing_sink_is_isolated_from_healthy_sink() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["alpha"], 10, 40);
    let tabular = Arc::new(MemorySink::failing("tabular"));
    let structured = Arc::new(MemorySink::new("structured"));
    let h = harness(
        &config,
        dir.path(),
        Arc::new(SimulationStub::new(8)),
        vec![tabular.clone(), structured.clone()],
        2,
    )
    .await;

    let summary = run(&h).await;

    assert_eq!(summary.termination, TerminationReason::BacklogEmpty);
    assert_eq!(summary.joins_in(JoinState::Joined), 2);
    assert!(summary.messages_persisted > 0);
    assert_eq!(
        structured.message_keys().await.len() as u64,
        summary.messages_persisted
    );
    assert!(tabular.records().await.is_empty());
    assert_eq!(summary.sink_failures.get("tabular"), Some(&tabular.rejected()));
    assert!(!summary.sink_failures.contains_key("structured"));
}

#[tokio::test]
async fn batch_stops_when_every_sink_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["alpha"], 10, 40);
    let only = Arc::new(MemorySink::failing("only"));
    let stub = Arc::new(SimulationStub::new(9));
    stub.script_fetch(
        &reference(1),
        FetchScript::Batch((1..=3).map(|id| SimulationStub::message(id, "hello")).collect()),
    )
    .await;
    let h = harness(&config, dir.path(), stub, vec![only], 1).await;

    let summary = run(&h).await;

    assert_eq!(summary.scrapes_in(ScrapeState::Partial), 1);
    assert_eq!(summary.messages_persisted, 0);
    let group = groups::get_group(&h.db, &GroupId::from_reference(&reference(1)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(group.cursor, None);
}

// ---- Determinism and durability ----

#[tokio::test]
async fn identical_inputs_give_identical_runs() {
    let mut config = config(&["alpha", "beta", "gamma"], 4, 10);
    config.simulation.seed = 7;

    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(SimulationStub::from_config(&config.simulation));
        let h = harness(&config, dir.path(), stub, vec![], 12).await;
        let summary = run(&h).await;
        let snapshot = h
            .orchestrator
            .ledger()
            .snapshot(&h.clock.today())
            .await
            .unwrap();
        outcomes.push((
            h.stub.calls().await,
            snapshot.accounts,
            snapshot.global,
            summary.joins,
            summary.termination,
            h.orchestrator.limiter().call_log().await,
        ));
    }

    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test]
async fn blacklisted_groups_are_never_retried_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["alpha"], 10, 40);
    let full = reference(1);
    let invalid = reference(2);

    let stub = Arc::new(SimulationStub::new(10));
    stub.script_join(&full, JoinScript::Outcome(JoinOutcome::ChannelFull))
        .await;
    stub.script_join(&invalid, JoinScript::Outcome(JoinOutcome::InviteInvalid))
        .await;
    let first = harness(&config, dir.path(), stub, vec![], 3).await;
    let summary = run(&first).await;
    assert_eq!(summary.joins_in(JoinState::ChannelFull), 1);
    assert_eq!(summary.joins_in(JoinState::InviteInvalid), 1);
    assert_eq!(groups::group_counts(&first.db).await.unwrap().blacklisted, 2);
    first.db.close().await.unwrap();

    // The candidate file still lists both groups after the restart.
    let second = harness(&config, dir.path(), Arc::new(SimulationStub::new(10)), vec![], 5).await;
    run(&second).await;
    let joined: Vec<String> = joins_by(&second.stub.calls().await)
        .into_iter()
        .map(|(_, group)| group)
        .collect();
    assert!(!joined.contains(&full));
    assert!(!joined.contains(&invalid));
    assert_eq!(joined, vec![reference(4), reference(5)]);
}

#[tokio::test]
async fn quota_counts_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["alpha"], 3, 40);

    let first = harness(&config, dir.path(), Arc::new(SimulationStub::new(2)), vec![], 2).await;
    run(&first).await;
    first.db.close().await.unwrap();

    let second = harness(&config, dir.path(), Arc::new(SimulationStub::new(2)), vec![], 6).await;
    let summary = run(&second).await;

    // Two joins already counted today, so only one more is admitted.
    assert_eq!(summary.joins_in(JoinState::Joined), 1);
    assert_eq!(summary.global_joins_today, 3);
    assert_eq!(summary.termination, TerminationReason::AccountQuotaExhausted);
}

// ---- Failure handling ----

#[tokio::test]
async fn unauthorized_account_is_disabled_and_group_retried_elsewhere() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["alpha", "beta"], 10, 40);
    let stub = Arc::new(SimulationStub::new(12));
    stub.script_account_join("alpha", 1, JoinScript::Unauthorized)
        .await;
    let h = harness(&config, dir.path(), stub, vec![], 1).await;

    let summary = run(&h).await;

    assert_eq!(summary.joins_in(JoinState::Unauthorized), 1);
    assert_eq!(summary.joins_in(JoinState::Joined), 1);
    assert_eq!(
        joins_by(&h.stub.calls().await),
        vec![
            ("alpha".to_string(), reference(1)),
            ("beta".to_string(), reference(1)),
        ]
    );
    let row = harvester_storage::queries::accounts::get_account(&h.db, "alpha")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.state, AccountState::Disabled);
}

#[tokio::test]
async fn every_account_disabled_needs_intervention() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["alpha"], 10, 40);
    let stub = Arc::new(SimulationStub::new(13));
    stub.script_account_join("alpha", 1, JoinScript::Unauthorized)
        .await;
    let h = harness(&config, dir.path(), stub, vec![], 3).await;

    let summary = run(&h).await;

    assert_eq!(summary.termination, TerminationReason::AccountsDisabled);
    assert!(summary.termination.needs_intervention());
    assert_eq!(h.stub.join_calls(), 1);
    assert_eq!(groups::group_counts(&h.db).await.unwrap().pending, 3);
}

#[tokio::test]
async fn transient_errors_are_retried_through_the_limiter() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&["alpha"], 10, 40);
    config.retry.max_attempts = 3;
    let stub = Arc::new(SimulationStub::new(14));
    stub.script_join(&reference(1), JoinScript::Transient("connection reset".into()))
        .await;
    stub.script_join(&reference(1), JoinScript::Transient("connection reset".into()))
        .await;
    let h = harness(&config, dir.path(), stub, vec![], 1).await;
    let started = h.clock.now();

    let summary = run(&h).await;

    assert_eq!(summary.joins_in(JoinState::Joined), 1);
    assert_eq!(h.stub.join_calls(), 3);
    assert_eq!(
        h.orchestrator
            .limiter()
            .calls(harvester_crawler::DelayKind::Join),
        3
    );
    // Backoff 500ms then 1000ms on the manual clock.
    assert!(h.clock.now() - started >= chrono::Duration::milliseconds(1500));
    assert_eq!(audit::join_attempts_for(&h.db, &GroupId::from_reference(&reference(1))).await.unwrap().len(), 1);
}

#[tokio::test]
async fn cancellation_before_start_admits_no_joins() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["alpha"], 10, 40);
    let h = harness(&config, dir.path(), Arc::new(SimulationStub::new(15)), vec![], 3).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = h.orchestrator.run(cancel).await.unwrap();

    assert_eq!(summary.termination, TerminationReason::Cancelled);
    assert_eq!(h.stub.join_calls(), 0);
    assert_eq!(h.orchestrator.backlog_len().await, 3);
}
