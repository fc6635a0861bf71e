// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message classifier trait.

use async_trait::async_trait;

use crate::error::HarvesterError;
use crate::types::Classification;

/// Scores and labels message text for job relevance.
///
/// Failures are returned as [`HarvesterError::Classification`]; the scrape
/// workflow stores the message with a null classification and carries on.
#[async_trait]
pub trait Classifier: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn classify(&self, text: &str) -> Result<Classification, HarvesterError>;
}
