// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the crawler, storage, and adapter crates.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Stable identifier of a candidate group (its normalized link or handle).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    /// Normalizes a link or handle into an id: trims whitespace and trailing slashes.
    pub fn from_reference(reference: &str) -> Self {
        GroupId(reference.trim().trim_end_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health status reported by sinks and clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational but at least one write failed.
    Degraded(String),
    /// Not operational.
    Unhealthy(String),
}

// --- Accounts ---

/// Lifecycle state of a crawling account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountState {
    /// Never used this run.
    Idle,
    /// Used at least once this run and still usable.
    Active,
    /// Backing off after a flood wait until `resume_at`.
    Cooldown { resume_at: DateTime<Utc> },
    /// Session rejected. Only an operator can clear this.
    Disabled,
}

impl AccountState {
    /// Storage representation of the state tag (resume time is stored separately).
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountState::Idle => "idle",
            AccountState::Active => "active",
            AccountState::Cooldown { .. } => "cooldown",
            AccountState::Disabled => "disabled",
        }
    }

    /// Rebuilds a state from its storage columns.
    pub fn from_parts(tag: &str, resume_at: Option<DateTime<Utc>>) -> Option<Self> {
        match (tag, resume_at) {
            ("idle", _) => Some(AccountState::Idle),
            ("active", _) => Some(AccountState::Active),
            ("cooldown", Some(resume_at)) => Some(AccountState::Cooldown { resume_at }),
            ("disabled", _) => Some(AccountState::Disabled),
            _ => None,
        }
    }

    pub fn resume_at(&self) -> Option<DateTime<Utc>> {
        match self {
            AccountState::Cooldown { resume_at } => Some(*resume_at),
            _ => None,
        }
    }
}

/// Session credentials for one account. Never logged.
#[derive(Debug)]
pub struct Credentials {
    pub api_id: i64,
    pub api_hash: SecretString,
    pub session: Option<SecretString>,
}

/// A crawling identity with its persisted lifecycle state.
#[derive(Debug, Clone)]
pub struct Account {
    /// Configured account name, unique. Used as the ledger key.
    pub name: String,
    /// Phone number or handle.
    pub phone: String,
    pub credentials: Arc<Credentials>,
    pub state: AccountState,
}

impl Account {
    /// Account with no credentials, used by the simulator and tests.
    pub fn simulated(name: &str) -> Self {
        Self {
            name: name.to_string(),
            phone: format!("+000{name}"),
            credentials: Arc::new(Credentials {
                api_id: 0,
                api_hash: SecretString::from(String::new()),
                session: None,
            }),
            state: AccountState::Idle,
        }
    }
}

// --- Groups ---

/// Lifecycle state of a candidate group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum GroupState {
    Pending,
    Joined,
    Blacklisted,
}

/// A candidate group and its crawl progress.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub id: GroupId,
    /// Link or handle handed to the network client.
    pub reference: String,
    pub category: String,
    /// Higher is attempted first.
    pub priority: i64,
    /// Insertion order, the stable tie-break between equal priorities.
    pub seq: i64,
    pub state: GroupState,
    /// Id of the last fully persisted message.
    pub cursor: Option<i64>,
    pub last_scraped_at: Option<DateTime<Utc>>,
    /// Account holding the membership, once joined.
    pub joined_by: Option<String>,
}

/// A group as read from the candidate source, before it has any state.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub reference: String,
    pub category: String,
    pub priority: i64,
}

// --- Messages ---

/// A message exactly as returned by the network client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Unique within the group and increasing with time.
    pub id: i64,
    pub sender_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

/// Classifier verdict for a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Job,
    Other,
}

/// Score, label, and structured fields extracted from a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Relevance score in 0..=100.
    pub score: f64,
    pub label: Label,
    /// Score mapped into 0.0..=1.0.
    pub confidence: f64,
    pub skills: Vec<String>,
    pub contacts: Vec<String>,
    pub salary: Option<String>,
    pub experience: Option<String>,
    pub location: Option<String>,
    pub remote: bool,
    pub fresher_friendly: bool,
}

/// A message ingested from a group. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub group_id: GroupId,
    pub message_id: i64,
    pub sender_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    /// `None` until classified, or when classification failed.
    pub classification: Option<Classification>,
}

impl Message {
    pub fn from_raw(group_id: &GroupId, raw: RawMessage) -> Self {
        Self {
            group_id: group_id.clone(),
            message_id: raw.id,
            sender_id: raw.sender_id,
            timestamp: raw.timestamp,
            text: raw.text,
            classification: None,
        }
    }
}

// --- Network outcomes ---

/// Result of a join request as reported by the network client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
    FloodWait { seconds: u64 },
    InviteInvalid,
    ChannelFull,
    Failed { detail: String },
}

// --- Audit trail ---

/// Terminal state of one join attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum JoinState {
    Joined,
    AlreadyMember,
    FloodWaited,
    InviteInvalid,
    ChannelFull,
    Failed,
    Unauthorized,
}

impl JoinState {
    /// The group can be scraped after this outcome.
    pub fn is_member(self) -> bool {
        matches!(self, JoinState::Joined | JoinState::AlreadyMember)
    }
}

/// Terminal state of one scrape attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum ScrapeState {
    /// Every fetched message was persisted or skipped as a duplicate.
    Completed,
    /// Persistence stopped mid-batch; the cursor stays at the last persisted message.
    Partial,
    FloodWaited,
    Unauthorized,
    Failed,
}

/// Append-only audit row for a join attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinAttempt {
    /// Also the idempotency key of the matching quota commit.
    pub id: String,
    pub account: String,
    pub group_id: GroupId,
    pub attempted_at: DateTime<Utc>,
    pub outcome: JoinState,
    pub detail: Option<String>,
}

/// Append-only audit row for a scrape attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeAttempt {
    pub id: String,
    pub account: String,
    pub group_id: GroupId,
    pub attempted_at: DateTime<Utc>,
    pub outcome: ScrapeState,
    pub fetched: u32,
    pub persisted: u32,
    pub duplicates: u32,
    pub cursor: Option<i64>,
    pub detail: Option<String>,
}

// --- Sink records ---

/// Kind of record handed to a storage sink.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Group,
    Message,
    Job,
    Account,
}

/// A group membership as exported to sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub group_id: GroupId,
    pub reference: String,
    pub category: String,
    pub account: String,
    pub joined_at: DateTime<Utc>,
    pub outcome: JoinState,
}

/// A job posting derived from a classified message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub group_id: GroupId,
    pub message_id: i64,
    pub posted_at: DateTime<Utc>,
    pub score: f64,
    pub skills: Vec<String>,
    pub contacts: Vec<String>,
    pub salary: Option<String>,
    pub location: Option<String>,
    pub remote: bool,
    pub fresher_friendly: bool,
    pub text: String,
}

impl JobRecord {
    /// Builds a job record when the message was classified as a job.
    pub fn from_message(message: &Message) -> Option<Self> {
        let c = message.classification.as_ref()?;
        if c.label != Label::Job {
            return None;
        }
        Some(Self {
            group_id: message.group_id.clone(),
            message_id: message.message_id,
            posted_at: message.timestamp,
            score: c.score,
            skills: c.skills.clone(),
            contacts: c.contacts.clone(),
            salary: c.salary.clone(),
            location: c.location.clone(),
            remote: c.remote,
            fresher_friendly: c.fresher_friendly,
            text: message.text.clone(),
        })
    }
}

/// End-of-run snapshot of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub name: String,
    pub phone: String,
    pub state: String,
    pub resume_at: Option<DateTime<Utc>>,
    pub joins_today: u32,
    pub recorded_at: DateTime<Utc>,
}

/// Any record a sink can store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Group(GroupRecord),
    Message(Message),
    Job(JobRecord),
    Account(AccountRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Group(_) => RecordKind::Group,
            Record::Message(_) => RecordKind::Message,
            Record::Job(_) => RecordKind::Job,
            Record::Account(_) => RecordKind::Account,
        }
    }

    /// Deterministic document id so replays overwrite rather than duplicate.
    pub fn document_id(&self) -> String {
        match self {
            Record::Group(g) => g.group_id.0.clone(),
            Record::Message(m) => format!("{}:{}", m.group_id, m.message_id),
            Record::Job(j) => format!("{}:{}", j.group_id, j.message_id),
            Record::Account(a) => format!("{}:{}", a.name, a.recorded_at.format("%Y-%m-%d")),
        }
    }

    /// Column names for tabular export of this record kind.
    pub fn columns(kind: RecordKind) -> &'static [&'static str] {
        match kind {
            RecordKind::Group => &["group", "reference", "category", "account", "joined_at", "outcome"],
            RecordKind::Message => &[
                "group", "message_id", "sender_id", "date", "text", "score", "label",
            ],
            RecordKind::Job => &[
                "group", "message_id", "date", "score", "skills", "contacts", "salary",
                "location", "remote", "fresher_friendly", "text",
            ],
            RecordKind::Account => &["name", "phone", "state", "resume_at", "joins_today", "recorded_at"],
        }
    }

    /// Flattens the record into one tabular row, matching [`Record::columns`].
    pub fn row(&self) -> Vec<String> {
        fn opt<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(ToString::to_string).unwrap_or_default()
        }
        // Tabular exports keep one record per line.
        fn flat(text: &str) -> String {
            text.replace(['\n', '\r'], " ")
        }

        match self {
            Record::Group(g) => vec![
                g.group_id.0.clone(),
                g.reference.clone(),
                g.category.clone(),
                g.account.clone(),
                g.joined_at.to_rfc3339(),
                g.outcome.to_string(),
            ],
            Record::Message(m) => vec![
                m.group_id.0.clone(),
                m.message_id.to_string(),
                opt(&m.sender_id),
                m.timestamp.to_rfc3339(),
                flat(&m.text),
                opt(&m.classification.as_ref().map(|c| c.score)),
                opt(&m.classification.as_ref().map(|c| c.label)),
            ],
            Record::Job(j) => vec![
                j.group_id.0.clone(),
                j.message_id.to_string(),
                j.posted_at.to_rfc3339(),
                j.score.to_string(),
                j.skills.join(", "),
                j.contacts.join(", "),
                opt(&j.salary),
                opt(&j.location),
                j.remote.to_string(),
                j.fresher_friendly.to_string(),
                flat(&j.text),
            ],
            Record::Account(a) => vec![
                a.name.clone(),
                a.phone.clone(),
                a.state.clone(),
                opt(&a.resume_at.map(|t| t.to_rfc3339())),
                a.joins_today.to_string(),
                a.recorded_at.to_rfc3339(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(id: i64, label: Option<Label>) -> Message {
        Message {
            group_id: GroupId::from_reference("https://t.me/rustjobs/"),
            message_id: id,
            sender_id: Some(42),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
            text: "Hiring a Rust developer\nremote".to_string(),
            classification: label.map(|label| Classification {
                score: 62.0,
                label,
                confidence: 0.62,
                skills: vec!["rust".into()],
                contacts: vec![],
                salary: None,
                experience: None,
                location: Some("remote".into()),
                remote: true,
                fresher_friendly: false,
            }),
        }
    }

    #[test]
    fn group_id_strips_trailing_slash_and_whitespace() {
        let id = GroupId::from_reference("  https://t.me/rustjobs/ ");
        assert_eq!(id.as_str(), "https://t.me/rustjobs");
    }

    #[test]
    fn account_state_storage_parts() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let state = AccountState::Cooldown { resume_at: at };
        assert_eq!(state.as_str(), "cooldown");
        assert_eq!(
            AccountState::from_parts("cooldown", Some(at)),
            Some(state.clone())
        );
        assert_eq!(AccountState::from_parts("cooldown", None), None);
        assert_eq!(
            AccountState::from_parts("disabled", None),
            Some(AccountState::Disabled)
        );
        assert_eq!(AccountState::from_parts("bogus", None), None);
    }

    #[test]
    fn job_record_only_for_job_label() {
        assert!(JobRecord::from_message(&message(1, None)).is_none());
        assert!(JobRecord::from_message(&message(1, Some(Label::Other))).is_none());
        let job = JobRecord::from_message(&message(7, Some(Label::Job))).unwrap();
        assert_eq!(job.message_id, 7);
        assert!(job.remote);
    }

    #[test]
    fn message_document_id_is_group_scoped() {
        let record = Record::Message(message(9, None));
        assert_eq!(record.kind(), RecordKind::Message);
        assert_eq!(record.document_id(), "https://t.me/rustjobs:9");
    }

    #[test]
    fn rows_match_columns_and_flatten_newlines() {
        let records = [
            Record::Message(message(3, Some(Label::Job))),
            Record::Job(JobRecord::from_message(&message(3, Some(Label::Job))).unwrap()),
        ];
        for record in &records {
            let row = record.row();
            assert_eq!(row.len(), Record::columns(record.kind()).len());
            assert!(row.iter().all(|cell| !cell.contains('\n')));
        }
    }

    #[test]
    fn join_state_round_trips_through_strings() {
        use std::str::FromStr;
        for state in [
            JoinState::Joined,
            JoinState::AlreadyMember,
            JoinState::FloodWaited,
            JoinState::InviteInvalid,
            JoinState::ChannelFull,
            JoinState::Failed,
            JoinState::Unauthorized,
        ] {
            assert_eq!(JoinState::from_str(&state.to_string()).unwrap(), state);
        }
        assert!(JoinState::AlreadyMember.is_member());
        assert!(!JoinState::FloodWaited.is_member());
    }
}
