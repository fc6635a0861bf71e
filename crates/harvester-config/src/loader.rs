// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./harvester.toml` > `~/.config/harvester/harvester.toml`
//! > `/etc/harvester/harvester.toml` with environment variable overrides via
//! the `HARVESTER_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::HarvesterConfig;

pub(crate) const LOCAL_FILE: &str = "harvester.toml";
pub(crate) const SYSTEM_FILE: &str = "/etc/harvester/harvester.toml";
pub(crate) const USER_FILE: &str = "harvester/harvester.toml";

/// Env key prefixes and the dotted paths they expand to, most specific first.
///
/// `HARVESTER_RATE_LIMIT_JOIN_MIN_SECS` arrives here as
/// `rate_limit_join_min_secs` and must become `rate_limit.join.min_secs`.
const SECTION_PREFIXES: &[(&str, &str)] = &[
    ("rate_limit_join_", "rate_limit.join."),
    ("rate_limit_scrape_", "rate_limit.scrape."),
    ("rate_limit_generic_", "rate_limit.generic."),
    ("sinks_csv_", "sinks.csv."),
    ("sinks_search_index_", "sinks.search_index."),
    ("simulation_weights_", "simulation.weights."),
    ("crawler_", "crawler."),
    ("quota_", "quota."),
    ("retry_", "retry."),
    ("storage_", "storage."),
    ("classifier_", "classifier."),
    ("network_", "network."),
    ("simulation_", "simulation."),
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/harvester/harvester.toml` (system-wide)
/// 3. `~/.config/harvester/harvester.toml` (user XDG config)
/// 4. `./harvester.toml` (local directory)
/// 5. `HARVESTER_*` environment variables
pub fn load_config() -> Result<HarvesterConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<HarvesterConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HarvesterConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<HarvesterConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HarvesterConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(HarvesterConfig::default()))
        .merge(Toml::file(SYSTEM_FILE))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join(USER_FILE))
                .unwrap_or_default(),
        ))
        .merge(Toml::file(LOCAL_FILE))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` since most key names
/// contain underscores themselves (`per_account_daily_cap`).
fn env_provider() -> Env {
    Env::prefixed("HARVESTER_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for (prefix, dotted) in SECTION_PREFIXES {
        if let Some(rest) = key.strip_prefix(prefix) {
            return format!("{dotted}{rest}");
        }
    }
    key.to_string()
}
