// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristic job-posting classification.
//!
//! Scores a message 0-100 from keyword hits, contact details, salary and
//! location mentions, length, and remote-work terms. Messages scoring at or
//! above the configured threshold are labelled [`Label::Job`].

use std::sync::LazyLock;

use async_trait::async_trait;
use harvester_config::model::ClassifierConfig;
use harvester_core::{Classification, Classifier, HarvesterError, Label};
use regex::Regex;

/// Hiring vocabulary.
const JOB_TERMS: &[&str] = &[
    "job", "jobs", "hiring", "career", "position", "opening", "vacancy", "opportunity",
    "fresher", "intern", "internship", "full-time", "part-time", "contract", "remote",
    "work from home", "wfh", "hybrid", "onsite", "developer", "engineer", "programmer",
    "analyst", "consultant", "recruitment", "talent", "candidate", "apply", "application",
];

/// Technology and discipline names reported as extracted skills.
const SKILLS: &[&str] = &[
    "html", "css", "javascript", "typescript", "react", "angular", "vue", "node", "python",
    "java", "php", "ruby", "c++", "c#", "golang", "rust", "sql", "mysql", "postgresql",
    "mongodb", "redis", "aws", "azure", "gcp", "docker", "kubernetes", "jenkins", "git",
    "frontend", "backend", "fullstack", "full-stack", "ui", "ux", "figma",
    "machine learning", "ml", "ai", "data science", "analytics",
];

/// Skills a newcomer can typically be hired for.
const ENTRY_SKILLS: &[&str] = &["html", "css", "javascript", "python", "react", "node"];

const FRESHER_TERMS: &[&str] = &[
    "fresher", "freshers", "entry level", "entry-level", "junior", "trainee", "intern",
    "internship", "new graduate", "recent graduate", "no experience", "beginner",
    "training provided",
];

const REMOTE_TERMS: &[&str] = &["remote", "work from home", "wfh", "hybrid"];

/// Checked in order; the first hit is reported as the location.
const LOCATIONS: &[&str] = &[
    "delhi", "mumbai", "bangalore", "bengaluru", "chennai", "hyderabad", "pune", "kolkata",
    "gurgaon", "noida", "india", "usa", "uk", "canada", "australia", "germany", "remote",
];

static EXPERIENCE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b\d+\s*(?:-|–|to)\s*\d+\s*(?:years?|yrs?)\b",
        r"(?i)\b\d+\+\s*(?:years?|yrs?)\b",
        r"(?i)\b(?:minimum|min\.?|at\s+least)\s+\d+\s*(?:years?|yrs?)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid experience pattern"))
    .collect()
});

static SALARY: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)₹\s*\d[\d,]*(?:\.\d+)?\s*(?:lakhs?|lacs?|cr|k|thousand)?",
        r"(?i)\b\d[\d,]*(?:\.\d+)?\s*(?:lpa|lakh per annum|lakhs?|lacs?)\b",
        r"(?i)\$\s*\d[\d,]*(?:\.\d+)?\s*k?(?:\s*(?:/|per\s+)(?:hr|hour|month|year|annum))?",
        r"(?i)\b(?:salary|stipend|ctc|pay)\s*[:\-]?\s*(?:₹|\$|rs\.?|inr|usd)?\s*\d[\d,]*(?:\.\d+)?\s*k?",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid salary pattern"))
    .collect()
});

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid email pattern")
});

static HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\w.@])(@[A-Za-z]\w{3,31})").expect("valid handle pattern"));

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d \-]{8,14}\d").expect("valid phone pattern"));

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:https?://|www\.)[^\s]+").expect("valid url pattern"));

/// Keyword-heuristic [`Classifier`].
pub struct KeywordClassifier {
    /// Score at or above which a message is a job.
    threshold: f64,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordClassifier {
    /// Classifier with the default job threshold of 40.
    pub fn new() -> Self {
        Self { threshold: 40.0 }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            threshold: config.job_threshold,
        }
    }

    /// Score and extract fields from one message.
    pub fn score(&self, text: &str) -> Classification {
        let lower = text.to_lowercase();

        let job_hits = JOB_TERMS.iter().filter(|t| contains_term(&lower, t)).count();
        let skills: Vec<String> = SKILLS
            .iter()
            .filter(|s| contains_term(&lower, s))
            .map(|s| s.to_string())
            .collect();
        let contacts = extract_contacts(text);
        let salary = first_match(&SALARY, text);
        let experience = first_match(&EXPERIENCE, text);
        let location = LOCATIONS
            .iter()
            .find(|l| contains_term(&lower, l))
            .map(|l| l.to_string());
        let remote = REMOTE_TERMS.iter().any(|t| contains_term(&lower, t));
        let word_count = text.split_whitespace().count();

        let mut score = 0.0;
        score += (job_hits as f64 * 2.0).min(20.0);
        score += (skills.len() as f64 * 3.0).min(20.0);
        if !contacts.is_empty() {
            score += 15.0;
        }
        if salary.is_some() {
            score += 15.0;
        }
        if location.is_some() {
            score += 10.0;
        }
        score += match word_count {
            50..=500 => 10.0,
            501.. => 5.0,
            _ => 0.0,
        };
        if remote {
            score += 10.0;
        }
        let score: f64 = score.min(100.0);

        let fresher_friendly = FRESHER_TERMS.iter().any(|t| contains_term(&lower, t))
            || experience.as_deref().is_some_and(is_entry_level_experience)
            || skills.iter().any(|s| ENTRY_SKILLS.contains(&s.as_str()));

        Classification {
            score,
            label: if score >= self.threshold {
                Label::Job
            } else {
                Label::Other
            },
            confidence: score / 100.0,
            skills,
            contacts,
            salary,
            experience,
            location,
            remote,
            fresher_friendly,
        }
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn classify(&self, text: &str) -> Result<Classification, HarvesterError> {
        if text.trim().is_empty() {
            return Err(HarvesterError::Classification(
                "message has no text".to_string(),
            ));
        }
        Ok(self.score(text))
    }
}

/// Whole-term match on lowercased text. Terms like `c++` or `work from home`
/// only need non-alphanumeric neighbours, not regex word boundaries.
fn contains_term(haystack: &str, term: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric();
    haystack.match_indices(term).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + term.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

fn first_match(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|p| p.find(text))
        .map(|m| m.as_str().trim().to_string())
}

/// The lower bound of an experience range is at most one year.
fn is_entry_level_experience(experience: &str) -> bool {
    experience
        .split(|c: char| !c.is_ascii_digit())
        .find(|part| !part.is_empty())
        .and_then(|min| min.parse::<u32>().ok())
        .is_some_and(|min_years| min_years <= 1)
}

/// Emails, handles, URLs and phone numbers, in that order, without duplicates.
fn extract_contacts(text: &str) -> Vec<String> {
    let mut contacts: Vec<String> = Vec::new();
    let mut push = |value: &str| {
        let value = value.trim().trim_end_matches(['.', ',', ')']).to_string();
        if !value.is_empty() && !contacts.contains(&value) {
            contacts.push(value);
        }
    };

    for m in EMAIL.find_iter(text) {
        push(m.as_str());
    }
    for caps in HANDLE.captures_iter(text) {
        if let Some(handle) = caps.get(1) {
            push(handle.as_str());
        }
    }
    for m in URL.find_iter(text) {
        push(m.as_str());
    }
    for m in PHONE.find_iter(text) {
        let digits = m.as_str().chars().filter(char::is_ascii_digit).count();
        if (10..=15).contains(&digits) {
            push(m.as_str());
        }
    }
    contacts
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSTING: &str = "We are hiring a junior Python developer (0-1 years). \
        Remote position, salary 6 LPA. Skills: python, django, sql, docker. \
        Apply via @acme_hr or jobs@acme.io. Based in Bangalore, India.";

    #[test]
    fn detailed_posting_is_a_job() {
        let c = KeywordClassifier::new().score(POSTING);
        assert_eq!(c.label, Label::Job);
        assert!(c.score >= 60.0, "score was {}", c.score);
        assert!((c.confidence - c.score / 100.0).abs() < f64::EPSILON);
        assert!(c.remote);
        assert!(c.fresher_friendly);
        assert_eq!(c.salary.as_deref(), Some("6 LPA"));
        assert_eq!(c.experience.as_deref(), Some("0-1 years"));
        assert_eq!(c.location.as_deref(), Some("bangalore"));
        assert!(c.skills.contains(&"python".to_string()));
        assert!(c.skills.contains(&"docker".to_string()));
        assert_eq!(c.contacts, vec!["jobs@acme.io", "@acme_hr"]);
    }

    #[test]
    fn chatter_is_other() {
        let c = KeywordClassifier::new().score("good morning everyone, any plans for the weekend?");
        assert_eq!(c.label, Label::Other);
        assert_eq!(c.score, 0.0);
        assert!(c.contacts.is_empty());
        assert!(!c.fresher_friendly);
    }

    #[test]
    fn terms_match_whole_words_only() {
        assert!(contains_term("looking for c++ devs", "c++"));
        assert!(contains_term("work from home ok", "work from home"));
        assert!(!contains_term("javascript", "java"));
        assert!(!contains_term("ukulele lessons", "uk"));
        assert!(!contains_term("building", "ui"));
    }

    #[test]
    fn senior_experience_is_not_fresher_friendly() {
        let c = KeywordClassifier::new().score("Hiring senior engineer, 5+ years, golang and kubernetes");
        assert_eq!(c.experience.as_deref(), Some("5+ years"));
        assert!(!c.fresher_friendly);
    }

    #[test]
    fn threshold_comes_from_config() {
        let strict = KeywordClassifier::from_config(&ClassifierConfig {
            enabled: true,
            job_threshold: 95.0,
        });
        assert_eq!(strict.score(POSTING).label, Label::Other);
    }

    #[test]
    fn phone_numbers_need_enough_digits() {
        let contacts = extract_contacts("call +91 98765 43210 or room 12345");
        assert_eq!(contacts, vec!["+91 98765 43210"]);
    }

    #[tokio::test]
    async fn empty_text_fails_classification() {
        let err = KeywordClassifier::new().classify("   ").await.unwrap_err();
        assert!(matches!(err, HarvesterError::Classification(_)));
    }
}
