// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message harvesting from a joined group.
//!
//! A batch is fetched above the stored cursor, processed oldest first, and
//! each message is claimed in the dedup index before it is classified and
//! fanned out to the sinks. The claim is marked persisted once a sink accepts
//! the record, and the cursor only moves past persisted messages.

use std::sync::Arc;

use harvester_core::types::JobRecord;
use harvester_core::{
    Account, Classifier, Clock, Group, HarvesterError, Message, NetworkClient, RawMessage, Record,
    ScrapeAttempt, ScrapeState,
};
use harvester_sink::SinkFanout;
use harvester_storage::queries::{audit, groups};
use harvester_storage::{Claim, Database, DedupIndex, DedupKey};
use tracing::{debug, error, info, warn};

use crate::account_pool::AccountPool;
use crate::rate_limiter::{DelayKind, RateLimiter};
use crate::retry::{RetryPolicy, with_retry};

/// Result of one scrape: the audit row plus derived job count.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeReport {
    pub attempt: ScrapeAttempt,
    pub jobs: u32,
}

pub struct ScrapeWorkflow {
    pub(crate) db: Database,
    pub(crate) client: Arc<dyn NetworkClient>,
    pub(crate) dedup: DedupIndex,
    pub(crate) classifier: Option<Arc<dyn Classifier>>,
    pub(crate) sinks: Arc<SinkFanout>,
    pub(crate) pool: Arc<AccountPool>,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) retry: RetryPolicy,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) messages_per_group: u32,
}

/// Running totals for one batch.
#[derive(Default)]
struct Tally {
    persisted: u32,
    duplicates: u32,
    jobs: u32,
    newest: Option<i64>,
    stopped: Option<String>,
}

impl ScrapeWorkflow {
    /// Scrapes `group` with `account`, which must hold the membership.
    ///
    /// Network failures become the attempt's outcome. Only core database
    /// failures are returned as errors.
    pub async fn run(&self, group: &Group, account: &Account) -> Result<ScrapeReport, HarvesterError> {
        let attempt_id = uuid::Uuid::new_v4().to_string();
        // The stored cursor is authoritative; the caller's copy may be stale.
        let cursor = groups::get_group(&self.db, &group.id)
            .await?
            .and_then(|g| g.cursor)
            .or(group.cursor);

        let client = self.client.clone();
        let reference = group.reference.clone();
        let limit = self.messages_per_group;
        let retried = with_retry(
            &self.retry,
            &self.limiter,
            self.clock.as_ref(),
            DelayKind::Scrape,
            || {
                let client = client.clone();
                let reference = reference.clone();
                let account = account.clone();
                async move { client.fetch_messages(&reference, &account, cursor, limit).await }
            },
        )
        .await;

        let batch = match retried.result {
            Ok(batch) => batch,
            Err(e @ HarvesterError::Storage { .. }) => return Err(e),
            Err(e) => {
                let (outcome, detail) = match &e {
                    HarvesterError::FloodWait { seconds } => {
                        self.pool.cooldown(&account.name, *seconds).await?;
                        (ScrapeState::FloodWaited, format!("flood wait {seconds}s"))
                    }
                    HarvesterError::Auth { message, .. } => {
                        self.pool.disable(&account.name).await?;
                        (ScrapeState::Unauthorized, message.clone())
                    }
                    other if other.is_transient() => (
                        ScrapeState::Failed,
                        format!("gave up after {} attempts: {other}", retried.attempts),
                    ),
                    other => (ScrapeState::Failed, other.to_string()),
                };
                warn!(group = %group.id, account = %account.name, outcome = %outcome, error = %e, "fetch failed");
                let attempt = ScrapeAttempt {
                    id: attempt_id,
                    account: account.name.clone(),
                    group_id: group.id.clone(),
                    attempted_at: self.clock.now(),
                    outcome,
                    fetched: 0,
                    persisted: 0,
                    duplicates: 0,
                    cursor,
                    detail: Some(detail),
                };
                audit::insert_scrape_attempt(&self.db, &attempt).await?;
                return Ok(ScrapeReport { attempt, jobs: 0 });
            }
        };

        let fetched = batch.len() as u32;
        let tally = self.ingest(group, batch).await?;

        let now = self.clock.now();
        groups::record_scrape(&self.db, &group.id, tally.newest, now).await?;

        let outcome = if tally.stopped.is_some() {
            ScrapeState::Partial
        } else {
            ScrapeState::Completed
        };
        let attempt = ScrapeAttempt {
            id: attempt_id,
            account: account.name.clone(),
            group_id: group.id.clone(),
            attempted_at: now,
            outcome,
            fetched,
            persisted: tally.persisted,
            duplicates: tally.duplicates,
            cursor: tally.newest.max(cursor),
            detail: tally.stopped,
        };
        audit::insert_scrape_attempt(&self.db, &attempt).await?;
        info!(
            group = %group.id,
            account = %account.name,
            fetched,
            persisted = attempt.persisted,
            duplicates = attempt.duplicates,
            jobs = tally.jobs,
            outcome = %outcome,
            "scraped group"
        );
        Ok(ScrapeReport {
            attempt,
            jobs: tally.jobs,
        })
    }

    async fn ingest(&self, group: &Group, mut batch: Vec<RawMessage>) -> Result<Tally, HarvesterError> {
        batch.sort_by_key(|m| m.id);
        batch.dedup_by_key(|m| m.id);

        let mut tally = Tally::default();
        for raw in batch {
            let key = DedupKey::Message(group.id.clone(), raw.id);
            match self.dedup.claim(&key).await? {
                Claim::Claimed => {}
                Claim::Duplicate => {
                    debug!(group = %group.id, message = raw.id, "duplicate message skipped");
                    tally.duplicates += 1;
                    tally.newest = Some(raw.id);
                    continue;
                }
                Claim::InFlight => {
                    warn!(group = %group.id, message = raw.id, "message claimed by another worker, stopping batch");
                    tally.stopped = Some(format!("message {} is still in flight", raw.id));
                    break;
                }
            }

            let mut message = Message::from_raw(&group.id, raw);
            message.classification = self.classify(&message).await;

            let result = self.sinks.append(&Record::Message(message.clone())).await;
            if !result.persisted() {
                self.dedup.release(&key).await?;
                error!(
                    group = %group.id,
                    message = message.message_id,
                    "no sink accepted message, stopping batch"
                );
                tally.stopped = Some(format!(
                    "every sink rejected message {}",
                    message.message_id
                ));
                break;
            }

            self.dedup.mark(&key).await?;
            tally.persisted += 1;
            tally.newest = Some(message.message_id);
            if let Some(job) = JobRecord::from_message(&message) {
                self.sinks.append(&Record::Job(job)).await;
                tally.jobs += 1;
            }
        }
        Ok(tally)
    }

    /// Best-effort: a failing classifier leaves the message unclassified.
    async fn classify(&self, message: &Message) -> Option<harvester_core::Classification> {
        let classifier = self.classifier.as_ref()?;
        match classifier.classify(&message.text).await {
            Ok(classification) => Some(classification),
            Err(e) => {
                debug!(
                    group = %message.group_id,
                    message = message.message_id,
                    classifier = classifier.name(),
                    error = %e,
                    "classification skipped"
                );
                None
            }
        }
    }
}
