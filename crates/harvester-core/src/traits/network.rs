// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Network client trait for joining groups and fetching their messages.

use async_trait::async_trait;

use crate::error::HarvesterError;
use crate::types::{Account, JoinOutcome, RawMessage};

/// Client for the messaging platform, real or simulated.
///
/// Implementations report categorized join results through [`JoinOutcome`]
/// and signal `Transient`, `FloodWait`, and `Auth` conditions through
/// [`HarvesterError`]. The crawl workflows never branch on which
/// implementation they are talking to.
#[async_trait]
pub trait NetworkClient: Send + Sync + 'static {
    /// Human-readable name of the client, for logs.
    fn name(&self) -> &str;

    /// Attempts to join `group_ref` with `account`.
    async fn join(&self, group_ref: &str, account: &Account)
        -> Result<JoinOutcome, HarvesterError>;

    /// Fetches up to `limit` of the most recent messages newer than `cursor`.
    ///
    /// `cursor` is the id of the last message already ingested, or `None` on
    /// the first scrape. Ordering of the returned batch is unspecified.
    async fn fetch_messages(
        &self,
        group_ref: &str,
        account: &Account,
        cursor: Option<i64>,
        limit: u32,
    ) -> Result<Vec<RawMessage>, HarvesterError>;
}
