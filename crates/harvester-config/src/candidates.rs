// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Candidate group source.
//!
//! The backlog is seeded from a JSON array of entries such as
//! `{"link": "https://t.me/rustjobs", "category": "jobs", "priority": "high"}`.
//! `url` is accepted as an alias for `link`; entries with neither are skipped.

use std::path::Path;

use harvester_core::Candidate;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::diagnostic::ConfigError;

#[derive(Debug, Deserialize)]
struct RawCandidate {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<RawPriority>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPriority {
    Weight(i64),
    Named(String),
}

impl RawPriority {
    fn weight(&self) -> i64 {
        match self {
            RawPriority::Weight(w) => *w,
            RawPriority::Named(name) => match name.trim().to_ascii_lowercase().as_str() {
                "high" => 3,
                "medium" => 2,
                "low" => 1,
                other => other.parse().unwrap_or(1),
            },
        }
    }
}

/// Read candidates from a JSON file, keeping only `category_filter` matches.
pub fn load_candidates(
    path: &Path,
    category_filter: Option<&str>,
) -> Result<Vec<Candidate>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Candidates {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_candidates(&content, category_filter).map_err(|message| ConfigError::Candidates {
        path: path.display().to_string(),
        message,
    })
}

/// Parse a candidate JSON document.
///
/// The category filter is case-insensitive. Entries missing a category
/// default to `general`; missing priorities weigh as `low`.
pub fn parse_candidates(
    content: &str,
    category_filter: Option<&str>,
) -> Result<Vec<Candidate>, String> {
    let raw: Vec<RawCandidate> = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let filter = category_filter
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_lowercase);

    let mut candidates = Vec::with_capacity(raw.len());
    for (i, entry) in raw.into_iter().enumerate() {
        let Some(reference) = entry
            .link
            .or(entry.url)
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
        else {
            warn!(index = i, "skipping candidate without link");
            continue;
        };

        let category = entry
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "general".to_string());

        if let Some(filter) = &filter
            && category.to_lowercase() != *filter
        {
            continue;
        }

        candidates.push(Candidate {
            reference,
            category,
            priority: entry.priority.as_ref().map_or(1, RawPriority::weight),
        });
    }

    debug!(count = candidates.len(), "loaded candidate groups");
    Ok(candidates)
}
