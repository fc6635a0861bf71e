// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Figment says what went wrong; this module says where. Each extraction
//! failure becomes a miette report labelled at the offending line of
//! `harvester.toml`, and an unknown key carries the closest accepted key as
//! a hint.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use figment::error::Kind;
use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a known key needs before it is offered as a hint.
/// Enough for `wrokers` -> `workers` and `per_acount_daily_cap`.
const HINT_THRESHOLD: f64 = 0.75;

/// Everything that can be wrong with a configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("`{key}` is not a harvester setting")]
    #[diagnostic(
        code(harvester::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        /// Keys the enclosing table accepts, comma separated.
        valid_keys: String,
        #[label("unrecognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: {detail}")]
    #[diagnostic(code(harvester::config::invalid_type), help("use a value of type {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
        #[label("wrong type")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` is required")]
    #[diagnostic(
        code(harvester::config::missing_key),
        help("set `{key}` in harvester.toml")
    )]
    MissingKey { key: String },

    /// The file parsed but a value breaks a rule: caps, ranges, duplicates.
    #[error("invalid configuration: {message}")]
    #[diagnostic(code(harvester::config::validation))]
    Validation { message: String },

    #[error("candidate source `{path}`: {message}")]
    #[diagnostic(
        code(harvester::config::candidates),
        help("crawler.candidate_source must point at a JSON array of group entries")
    )]
    Candidates { path: String, message: String },

    #[error("{0}")]
    #[diagnostic(code(harvester::config::other))]
    Other(String),
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            message: message.into(),
        }
    }
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(key) => format!("did you mean `{key}`? accepted here: {valid_keys}"),
        None => format!("accepted here: {valid_keys}"),
    }
}

/// One diagnostic per failure chained in `err`, so every problem in the file
/// is reported in a single pass.
///
/// `sources` pairs each loaded file path with its content.
pub fn from_figment(err: figment::Error, sources: &[(String, String)]) -> Vec<ConfigError> {
    err.into_iter().map(|error| diagnose(&error, sources)).collect()
}

fn diagnose(error: &figment::Error, sources: &[(String, String)]) -> ConfigError {
    match &error.kind {
        Kind::UnknownField(field, accepted) => {
            let (span, src) = locate(error, &error.path, field, sources);
            ConfigError::UnknownKey {
                key: dotted(&error.path, field),
                suggestion: suggest_key(field, accepted),
                valid_keys: accepted.join(", "),
                span,
                src,
            }
        }
        Kind::MissingField(field) => ConfigError::MissingKey {
            key: dotted(&error.path, field),
        },
        Kind::InvalidType(actual, expected) => {
            // The path ends with the key itself.
            let (table, field) = match error.path.split_last() {
                Some((field, table)) => (table, field.as_str()),
                None => (&[][..], ""),
            };
            let (span, src) = locate(error, table, field, sources);
            ConfigError::InvalidType {
                key: error.path.join("."),
                detail: format!("found {actual}, expected {expected}"),
                expected: expected.to_string(),
                span,
                src,
            }
        }
        _ => ConfigError::Other(error.to_string()),
    }
}

fn dotted(table: &[String], field: &str) -> String {
    table
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(field))
        .collect::<Vec<_>>()
        .join(".")
}

/// Label span and source text for `field`, when the file it came from is
/// among `sources`.
fn locate(
    error: &figment::Error,
    table: &[String],
    field: &str,
    sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let origin = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|source| match source {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });
    let source = match origin {
        Some(path) => sources.iter().find(|(p, _)| *p == path),
        // Inline strings carry no file metadata.
        None => match sources {
            [only] => Some(only),
            _ => None,
        },
    };

    let Some((path, content)) = source else {
        return (None, None);
    };
    match find_key_offset(content, table, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(path, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` inside the table named by `path`.
///
/// Numeric path segments are array indices and are skipped, so
/// `["accounts", "0"]` matches the first `[[accounts]]` block. An empty path
/// means the top-level keys before the first header. The search ends at the
/// header following the matched table.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let wanted = path
        .iter()
        .map(String::as_str)
        .filter(|segment| segment.parse::<usize>().is_err())
        .collect::<Vec<_>>()
        .join(".");

    let mut inside = wanted.is_empty();
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let trimmed = line.trim_start();

        if let Some(header) = table_header(trimmed) {
            if inside {
                return None;
            }
            inside = header == wanted;
            continue;
        }
        if inside && key_name(trimmed) == Some(field) {
            return Some(start + line.len() - trimmed.len());
        }
    }
    None
}

/// `[a.b]` and `[[a]]` header names.
fn table_header(line: &str) -> Option<&str> {
    let inner = line.strip_prefix("[[").or_else(|| line.strip_prefix('['))?;
    inner.split(']').next().map(str::trim)
}

/// Bare key on the left of `=`, ignoring comments.
fn key_name(line: &str) -> Option<&str> {
    if line.starts_with('#') {
        return None;
    }
    let (key, _) = line.split_once('=')?;
    Some(key.trim_end())
}

/// Closest accepted key to `unknown`, if any clears the threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > HINT_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print each error to stderr with miette's graphical report.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut report = String::new();
        match handler.render_report(&mut report, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{report}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}
