// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic network client for simulated runs and tests.
//!
//! `SimulationStub` implements `NetworkClient` without any I/O. Results come
//! from, in order of precedence:
//!
//! 1. per-account scripts (`script_account_join`), keyed by the account's
//!    n-th join call;
//! 2. per-group scripted queues (`script_join`, `script_fetch`);
//! 3. a seeded RNG drawing join outcomes from the configured weights and
//!    synthesizing message history from a fixed corpus.
//!
//! The same seed and the same call sequence always produce the same results.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration};
use harvester_config::model::{OutcomeWeights, SimulationConfig};
use harvester_core::{Account, HarvesterError, JoinOutcome, NetworkClient, RawMessage};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::debug;

use crate::corpus;

/// Synthetic message `n` is posted `n * 90s` after this instant (2026-03-01T00:00:00Z).
const HISTORY_EPOCH_SECS: i64 = 1_772_323_200;

/// A scripted response to one join call.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinScript {
    Outcome(JoinOutcome),
    /// Fails with [`HarvesterError::Transient`].
    Transient(String),
    /// Fails with [`HarvesterError::Auth`] for the calling account.
    Unauthorized,
}

/// A scripted response to one fetch call.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchScript {
    /// Returned exactly as given, whatever the cursor.
    Batch(Vec<RawMessage>),
    FloodWait(u64),
    Transient(String),
    Unauthorized,
}

/// One recorded invocation, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubCall {
    Join {
        account: String,
        group: String,
    },
    Fetch {
        account: String,
        group: String,
        cursor: Option<i64>,
        limit: u32,
    },
}

struct StubState {
    rng: StdRng,
    join_scripts: HashMap<String, VecDeque<JoinScript>>,
    account_join_scripts: HashMap<(String, u64), JoinScript>,
    joins_per_account: HashMap<String, u64>,
    fetch_scripts: HashMap<String, VecDeque<FetchScript>>,
    /// Synthetic message history per group, ascending by id.
    history: HashMap<String, Vec<RawMessage>>,
    calls: Vec<StubCall>,
}

/// Seeded, scriptable stand-in for the platform.
pub struct SimulationStub {
    outcomes: Option<WeightedIndex<u32>>,
    flood_wait_secs: u64,
    messages_per_fetch: u32,
    state: Arc<Mutex<StubState>>,
    join_calls: AtomicU64,
    fetch_calls: AtomicU64,
}

impl SimulationStub {
    /// Stub with the given seed where every unscripted join succeeds.
    pub fn new(seed: u64) -> Self {
        Self::from_config(&SimulationConfig {
            seed,
            weights: OutcomeWeights::always_join(),
            ..SimulationConfig::default()
        })
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        let w = &config.weights;
        let weights = [
            w.joined,
            w.already_member,
            w.flood_wait,
            w.invite_invalid,
            w.channel_full,
            w.failed,
        ];
        let outcomes = match WeightedIndex::new(weights) {
            Ok(index) => Some(index),
            Err(e) => {
                tracing::warn!(error = %e, "unusable outcome weights, every join will succeed");
                None
            }
        };

        Self {
            outcomes,
            flood_wait_secs: config.flood_wait_secs,
            messages_per_fetch: config.messages_per_fetch.max(1),
            state: Arc::new(Mutex::new(StubState {
                rng: StdRng::seed_from_u64(config.seed),
                join_scripts: HashMap::new(),
                account_join_scripts: HashMap::new(),
                joins_per_account: HashMap::new(),
                fetch_scripts: HashMap::new(),
                history: HashMap::new(),
                calls: Vec::new(),
            })),
            join_calls: AtomicU64::new(0),
            fetch_calls: AtomicU64::new(0),
        }
    }

    /// Queue a response for the next unscripted join of `group_ref`.
    pub async fn script_join(&self, group_ref: &str, script: JoinScript) {
        self.state
            .lock()
            .await
            .join_scripts
            .entry(group_ref.to_string())
            .or_default()
            .push_back(script);
    }

    /// Script the `nth` (1-based) join call made by `account`, whatever the group.
    pub async fn script_account_join(&self, account: &str, nth: u64, script: JoinScript) {
        self.state
            .lock()
            .await
            .account_join_scripts
            .insert((account.to_string(), nth), script);
    }

    /// Queue a response for the next fetch of `group_ref`.
    pub async fn script_fetch(&self, group_ref: &str, script: FetchScript) {
        self.state
            .lock()
            .await
            .fetch_scripts
            .entry(group_ref.to_string())
            .or_default()
            .push_back(script);
    }

    /// Number of join calls received.
    pub fn join_calls(&self) -> u64 {
        self.join_calls.load(Ordering::SeqCst)
    }

    /// Number of fetch calls received.
    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Every call received so far, in order.
    pub async fn calls(&self) -> Vec<StubCall> {
        self.state.lock().await.calls.clone()
    }

    /// Builds a message the way the stub synthesizes them, for scripted batches.
    pub fn message(id: i64, text: &str) -> RawMessage {
        RawMessage {
            id,
            sender_id: Some(100_000_000 + id),
            timestamp: posted_at(id),
            text: text.to_string(),
        }
    }

    fn draw_outcome(&self, rng: &mut StdRng) -> JoinOutcome {
        let Some(outcomes) = &self.outcomes else {
            return JoinOutcome::Joined;
        };
        match outcomes.sample(rng) {
            0 => JoinOutcome::Joined,
            1 => JoinOutcome::AlreadyMember,
            2 => JoinOutcome::FloodWait {
                seconds: self.flood_wait_secs,
            },
            3 => JoinOutcome::InviteInvalid,
            4 => JoinOutcome::ChannelFull,
            _ => JoinOutcome::Failed {
                detail: "simulated failure".to_string(),
            },
        }
    }

    /// Appends newly "arrived" messages to the group's history.
    fn grow_history(&self, state: &mut StubState, group_ref: &str) {
        let low = (self.messages_per_fetch / 2).max(1);
        let arrivals = state.rng.gen_range(low..=self.messages_per_fetch);
        let mut fresh = Vec::with_capacity(arrivals as usize);
        let next_id = state
            .history
            .get(group_ref)
            .and_then(|h| h.last())
            .map_or(1, |m| m.id + 1);

        for id in next_id..next_id + i64::from(arrivals) {
            let text = corpus::MESSAGES[state.rng.gen_range(0..corpus::MESSAGES.len())];
            fresh.push(RawMessage {
                id,
                sender_id: Some(state.rng.gen_range(100_000_000..=999_999_999)),
                timestamp: posted_at(id),
                text: text.to_string(),
            });
        }
        state
            .history
            .entry(group_ref.to_string())
            .or_default()
            .extend(fresh);
    }
}

fn posted_at(id: i64) -> DateTime<chrono::Utc> {
    DateTime::from_timestamp(HISTORY_EPOCH_SECS, 0).unwrap_or_default()
        + ChronoDuration::seconds(id.saturating_mul(90))
}

fn auth_error(account: &Account) -> HarvesterError {
    HarvesterError::Auth {
        account: account.name.clone(),
        message: "simulated session revocation".to_string(),
    }
}

#[async_trait]
impl NetworkClient for SimulationStub {
    fn name(&self) -> &str {
        "simulation"
    }

    async fn join(&self, group_ref: &str, account: &Account) -> Result<JoinOutcome, HarvesterError> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        state.calls.push(StubCall::Join {
            account: account.name.clone(),
            group: group_ref.to_string(),
        });

        let nth = {
            let n = state.joins_per_account.entry(account.name.clone()).or_insert(0);
            *n += 1;
            *n
        };
        let scripted = match state.account_join_scripts.remove(&(account.name.clone(), nth)) {
            Some(script) => Some(script),
            None => state
                .join_scripts
                .get_mut(group_ref)
                .and_then(VecDeque::pop_front),
        };

        let outcome = match scripted {
            Some(JoinScript::Outcome(outcome)) => outcome,
            Some(JoinScript::Transient(message)) => return Err(HarvesterError::transient(message)),
            Some(JoinScript::Unauthorized) => return Err(auth_error(account)),
            None => self.draw_outcome(&mut state.rng),
        };
        debug!(group = group_ref, account = %account.name, ?outcome, "simulated join");
        Ok(outcome)
    }

    async fn fetch_messages(
        &self,
        group_ref: &str,
        account: &Account,
        cursor: Option<i64>,
        limit: u32,
    ) -> Result<Vec<RawMessage>, HarvesterError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        state.calls.push(StubCall::Fetch {
            account: account.name.clone(),
            group: group_ref.to_string(),
            cursor,
            limit,
        });

        match state
            .fetch_scripts
            .get_mut(group_ref)
            .and_then(VecDeque::pop_front)
        {
            Some(FetchScript::Batch(batch)) => return Ok(batch),
            Some(FetchScript::FloodWait(seconds)) => return Err(HarvesterError::FloodWait { seconds }),
            Some(FetchScript::Transient(message)) => return Err(HarvesterError::transient(message)),
            Some(FetchScript::Unauthorized) => return Err(auth_error(account)),
            None => {}
        }

        self.grow_history(&mut state, group_ref);
        let after = cursor.unwrap_or(0);
        // Newest first, like the platform.
        let batch: Vec<RawMessage> = state
            .history
            .get(group_ref)
            .into_iter()
            .flatten()
            .rev()
            .filter(|m| m.id > after)
            .take(limit as usize)
            .cloned()
            .collect();
        debug!(group = group_ref, account = %account.name, count = batch.len(), "simulated fetch");
        Ok(batch)
    }
}
