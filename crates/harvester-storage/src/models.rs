// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types and column conversions shared by the query modules.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;

/// Group totals per lifecycle state, for `harvester status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupCounts {
    pub pending: u64,
    pub joined: u64,
    pub blacklisted: u64,
}

impl GroupCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.joined + self.blacklisted
    }
}

/// A successful join read back from the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessfulJoin {
    pub attempt_id: String,
    pub account: String,
    pub group_id: String,
    /// UTC date of the attempt (`%Y-%m-%d`).
    pub date: String,
}

/// Canonical timestamp text stored in every `*_at` column.
pub(crate) fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn ts_from_sql(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_ts_from_sql(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| ts_from_sql(idx, &s)).transpose()
}

/// Parse a strum-backed enum column.
pub(crate) fn enum_from_sql<T: std::str::FromStr>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
