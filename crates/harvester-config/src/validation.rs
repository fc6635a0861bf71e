// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks the constraints serde cannot express: positive caps, ordered delay
//! ranges, unique account names and the settings each mode requires.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{DelayRange, HarvesterConfig};

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &HarvesterConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.crawler.workers == 0 {
        errors.push(ConfigError::validation("crawler.workers must be at least 1"));
    }

    if config.crawler.messages_per_group == 0 {
        errors.push(ConfigError::validation(
            "crawler.messages_per_group must be at least 1",
        ));
    }

    if config.crawler.candidate_source.trim().is_empty() {
        errors.push(ConfigError::validation(
            "crawler.candidate_source must not be empty",
        ));
    }

    if config.crawler.cooldown_poll_secs == 0 {
        errors.push(ConfigError::validation(
            "crawler.cooldown_poll_secs must be at least 1",
        ));
    }

    if config.quota.per_account_daily_cap == 0 {
        errors.push(ConfigError::validation(
            "quota.per_account_daily_cap must be at least 1",
        ));
    }

    if config.quota.global_daily_cap == 0 {
        errors.push(ConfigError::validation(
            "quota.global_daily_cap must be at least 1",
        ));
    }

    if config.quota.per_account_daily_cap > config.quota.global_daily_cap {
        errors.push(ConfigError::validation(format!(
            "quota.per_account_daily_cap ({}) must not exceed quota.global_daily_cap ({})",
            config.quota.per_account_daily_cap, config.quota.global_daily_cap
        )));
    }

    for (name, range) in [
        ("join", &config.rate_limit.join),
        ("scrape", &config.rate_limit.scrape),
        ("generic", &config.rate_limit.generic),
    ] {
        validate_range(name, range, &mut errors);
    }

    if config.retry.max_attempts == 0 {
        errors.push(ConfigError::validation("retry.max_attempts must be at least 1"));
    }

    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        errors.push(ConfigError::validation(format!(
            "retry.base_delay_ms ({}) must not exceed retry.max_delay_ms ({})",
            config.retry.base_delay_ms, config.retry.max_delay_ms
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    if config.sinks.csv.enabled && config.sinks.csv.directory.trim().is_empty() {
        errors.push(ConfigError::validation(
            "sinks.csv.directory must not be empty when the CSV sink is enabled",
        ));
    }

    let index = &config.sinks.search_index;
    if index.enabled {
        match index.url.as_deref().map(str::trim) {
            None | Some("") => errors.push(ConfigError::validation(
                "sinks.search_index.url is required when the search index sink is enabled",
            )),
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                errors.push(ConfigError::validation(format!(
                    "sinks.search_index.url `{url}` must start with http:// or https://"
                )));
            }
            Some(_) => {}
        }
        if index.index_prefix.trim().is_empty() {
            errors.push(ConfigError::validation(
                "sinks.search_index.index_prefix must not be empty",
            ));
        }
    }

    if !(0.0..=100.0).contains(&config.classifier.job_threshold) {
        errors.push(ConfigError::validation(format!(
            "classifier.job_threshold must be between 0 and 100, got {}",
            config.classifier.job_threshold
        )));
    }

    if config.crawler.simulation {
        if config.simulation.weights.total() == 0 {
            errors.push(ConfigError::validation(
                "simulation.weights must contain at least one non-zero weight",
            ));
        }
    } else {
        if config
            .network
            .bridge_url
            .as_deref()
            .is_none_or(|u| u.trim().is_empty())
        {
            errors.push(ConfigError::validation(
                "network.bridge_url is required unless crawler.simulation = true",
            ));
        }
        if config.accounts.is_empty() {
            errors.push(ConfigError::validation(
                "at least one [[accounts]] entry is required unless crawler.simulation = true",
            ));
        }
    }

    for (i, proxy) in config.network.proxies.iter().enumerate() {
        if proxy.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "network.proxies[{i}] must not be empty"
            )));
        }
    }

    let mut seen_names = HashSet::new();
    let mut seen_phones = HashSet::new();
    for (i, account) in config.accounts.iter().enumerate() {
        if account.name.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "accounts[{i}].name must not be empty"
            )));
        } else if !seen_names.insert(account.name.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate account name `{}` in [[accounts]] array",
                account.name
            )));
        }
        if account.phone.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "accounts[{i}].phone must not be empty"
            )));
        } else if !seen_phones.insert(account.phone.trim()) {
            errors.push(ConfigError::validation(format!(
                "accounts[{i}].phone `{}` is already used by another account",
                account.phone
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_range(name: &str, range: &DelayRange, errors: &mut Vec<ConfigError>) {
    if range.min_secs < 0.0 || range.max_secs < 0.0 {
        errors.push(ConfigError::validation(format!(
            "rate_limit.{name} delays must be non-negative"
        )));
    }
    if range.min_secs > range.max_secs {
        errors.push(ConfigError::validation(format!(
            "rate_limit.{name}.min_secs ({}) must not exceed max_secs ({})",
            range.min_secs, range.max_secs
        )));
    }
}
