// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One join attempt against one candidate group.
//!
//! `Requested -> Joining -> {Joined, AlreadyMember, FloodWaited,
//! InviteInvalid, ChannelFull, Failed, Unauthorized}`. Every terminal state is
//! written to the `join_attempts` audit table in the same transaction as the
//! group changes it implies; the attempt id doubles as the quota commit's
//! idempotency key.

use std::sync::Arc;

use harvester_core::types::GroupRecord;
use harvester_core::{
    Account, Clock, Group, HarvesterError, JoinAttempt, JoinOutcome, JoinState, NetworkClient, Record,
};
use harvester_quota::QuotaLedger;
use harvester_sink::SinkFanout;
use harvester_storage::queries::joins;
use harvester_storage::{Database, DedupIndex, DedupKey};
use tracing::{error, info, warn};

use crate::account_pool::AccountPool;
use crate::rate_limiter::{DelayKind, RateLimiter};
use crate::retry::{RetryPolicy, with_retry};

/// Everything a join attempt reads or mutates.
pub struct JoinWorkflow {
    pub(crate) db: Database,
    pub(crate) client: Arc<dyn NetworkClient>,
    pub(crate) ledger: Arc<QuotaLedger>,
    pub(crate) dedup: DedupIndex,
    pub(crate) pool: Arc<AccountPool>,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) retry: RetryPolicy,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) sinks: Arc<SinkFanout>,
}

impl JoinWorkflow {
    /// Runs one attempt with `account`, which must hold a quota reservation.
    ///
    /// The reservation is committed on `Joined` and released otherwise. Only
    /// core database failures are returned as errors.
    pub async fn run(&self, group: &Group, account: &Account) -> Result<JoinAttempt, HarvesterError> {
        let attempt_id = uuid::Uuid::new_v4().to_string();
        let dedup_key = DedupKey::Group(group.id.clone());

        let verdict = if self.dedup.seen(&dedup_key).await? {
            info!(group = %group.id, "group already joined, skipping network call");
            Verdict::new(JoinState::AlreadyMember, Some("already in joined set".to_string()))
        } else {
            let client = self.client.clone();
            let reference = group.reference.clone();
            let retried = with_retry(
                &self.retry,
                &self.limiter,
                self.clock.as_ref(),
                DelayKind::Join,
                || {
                    let client = client.clone();
                    let reference = reference.clone();
                    let account = account.clone();
                    async move { client.join(&reference, &account).await }
                },
            )
            .await;
            categorize(retried.result, retried.attempts)?
        };

        let Verdict {
            state,
            detail,
            wait,
        } = verdict;
        let now = self.clock.now();
        let attempt = JoinAttempt {
            id: attempt_id,
            account: account.name.clone(),
            group_id: group.id.clone(),
            attempted_at: now,
            outcome: state,
            detail,
        };

        // The audit row and the group changes share one transaction, which on
        // `Joined` is also the quota commit keyed by the attempt id.
        if state == JoinState::Joined {
            let row = attempt.clone();
            self.ledger
                .commit_with(&account.name, &attempt.id, move |conn| {
                    joins::apply_join_outcome(conn, &row)
                })
                .await?;
        } else {
            self.ledger.release(&account.name).await;
            joins::record_join_outcome(&self.db, &attempt).await?;
        }

        match state {
            JoinState::Joined | JoinState::AlreadyMember => {
                let record = Record::Group(GroupRecord {
                    group_id: group.id.clone(),
                    reference: group.reference.clone(),
                    category: group.category.clone(),
                    account: account.name.clone(),
                    joined_at: now,
                    outcome: state,
                });
                self.sinks.append(&record).await;
                info!(group = %group.id, account = %account.name, outcome = %state, "joined group");
            }
            JoinState::FloodWaited => {
                self.pool
                    .cooldown(&account.name, wait.unwrap_or(0))
                    .await?;
            }
            JoinState::InviteInvalid | JoinState::ChannelFull => {
                warn!(group = %group.id, outcome = %state, "group blacklisted");
            }
            JoinState::Unauthorized => {
                self.pool.disable(&account.name).await?;
            }
            JoinState::Failed => {
                error!(
                    group = %group.id,
                    account = %account.name,
                    detail = attempt.detail.as_deref().unwrap_or(""),
                    "join failed, group stays pending"
                );
            }
        }
        Ok(attempt)
    }
}

/// Terminal state of an attempt plus what the audit row and cooldown need.
#[derive(Debug, PartialEq)]
struct Verdict {
    state: JoinState,
    detail: Option<String>,
    /// Flood wait demanded by the platform, in seconds.
    wait: Option<u64>,
}

impl Verdict {
    fn new(state: JoinState, detail: Option<String>) -> Self {
        Self {
            state,
            detail,
            wait: None,
        }
    }
}

/// Maps the client's answer onto a terminal state.
/// Database failures are the only errors that escape.
fn categorize(result: Result<JoinOutcome, HarvesterError>, attempts: u32) -> Result<Verdict, HarvesterError> {
    Ok(match result {
        Ok(JoinOutcome::Joined) => Verdict::new(JoinState::Joined, None),
        Ok(JoinOutcome::AlreadyMember) => Verdict::new(JoinState::AlreadyMember, None),
        Ok(JoinOutcome::FloodWait { seconds }) | Err(HarvesterError::FloodWait { seconds }) => Verdict {
            state: JoinState::FloodWaited,
            detail: Some(format!("flood wait {seconds}s")),
            wait: Some(seconds),
        },
        Ok(JoinOutcome::InviteInvalid) => Verdict::new(JoinState::InviteInvalid, None),
        Err(HarvesterError::InvalidTarget { message, .. }) => {
            Verdict::new(JoinState::InviteInvalid, Some(message))
        }
        Ok(JoinOutcome::ChannelFull) => Verdict::new(JoinState::ChannelFull, None),
        Ok(JoinOutcome::Failed { detail }) => Verdict::new(JoinState::Failed, Some(detail)),
        Err(HarvesterError::Auth { message, .. }) => Verdict::new(JoinState::Unauthorized, Some(message)),
        Err(e @ HarvesterError::Storage { .. }) => return Err(e),
        Err(e) if e.is_transient() => Verdict::new(
            JoinState::Failed,
            Some(format!("gave up after {attempts} attempts: {e}")),
        ),
        Err(e) => Verdict::new(JoinState::Failed, Some(e.to_string())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_map_to_states() {
        let state = |r| categorize(r, 1).unwrap().state;
        assert_eq!(state(Ok(JoinOutcome::Joined)), JoinState::Joined);
        assert_eq!(state(Ok(JoinOutcome::ChannelFull)), JoinState::ChannelFull);
        assert_eq!(
            state(Err(HarvesterError::InvalidTarget {
                target: "g".into(),
                message: "no such group".into()
            })),
            JoinState::InviteInvalid
        );
        assert_eq!(
            state(Err(HarvesterError::Auth {
                account: "a".into(),
                message: "revoked".into()
            })),
            JoinState::Unauthorized
        );
        assert_eq!(state(Err(HarvesterError::transient("reset"))), JoinState::Failed);
    }

    #[test]
    fn flood_waits_carry_the_wait() {
        let from_error = categorize(Err(HarvesterError::FloodWait { seconds: 600 }), 1).unwrap();
        let from_outcome = categorize(Ok(JoinOutcome::FloodWait { seconds: 600 }), 1).unwrap();
        assert_eq!(from_error, from_outcome);
        assert_eq!(from_error.state, JoinState::FloodWaited);
        assert_eq!(from_error.wait, Some(600));
    }

    #[test]
    fn exhausted_retries_mention_attempts() {
        let verdict = categorize(Err(HarvesterError::transient("reset")), 3).unwrap();
        assert_eq!(verdict.state, JoinState::Failed);
        assert!(verdict.detail.unwrap().contains("after 3 attempts"));
    }

    #[test]
    fn storage_errors_escape() {
        let err = categorize(
            Err(HarvesterError::Storage {
                source: "disk I/O error".into(),
            }),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, HarvesterError::Storage { .. }));
    }
}
