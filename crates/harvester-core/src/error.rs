// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Harvester crawler.

use thiserror::Error;

/// The primary error type used across all Harvester crates.
///
/// The crawl workflows convert every variant except [`HarvesterError::Storage`]
/// on the core database into a state transition or an audit row, so most of
/// these never escape a run.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// Configuration errors (invalid TOML, missing required fields, bad ranges).
    #[error("configuration error: {0}")]
    Config(String),

    /// Core database errors (connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Recoverable network failure (connection reset, 5xx). Retried with backoff.
    #[error("transient network error: {message}")]
    Transient {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The platform asked the account to back off for `seconds`.
    #[error("flood wait: retry after {seconds}s")]
    FloodWait { seconds: u64 },

    /// The account's session was rejected. Requires operator action.
    #[error("authorization rejected for account {account}: {message}")]
    Auth { account: String, message: String },

    /// The target group can never be joined (bad link, unknown entity).
    #[error("invalid target {target}: {message}")]
    InvalidTarget { target: String, message: String },

    /// A storage sink rejected a record. Other sinks are unaffected.
    #[error("sink {sink} failed: {message}")]
    Sink {
        sink: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The classifier could not score a message.
    #[error("classification failed: {0}")]
    Classification(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HarvesterError {
    /// Whether the error is worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HarvesterError::Transient { .. } | HarvesterError::Timeout { .. }
        )
    }

    /// Shorthand for a transient error without an underlying source.
    pub fn transient(message: impl Into<String>) -> Self {
        HarvesterError::Transient {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a sink failure without an underlying source.
    pub fn sink(sink: impl Into<String>, message: impl Into<String>) -> Self {
        HarvesterError::Sink {
            sink: sink.into(),
            message: message.into(),
            source: None,
        }
    }
}
