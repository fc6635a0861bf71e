// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the session bridge API.

use chrono::{DateTime, Utc};
use harvester_core::{JoinOutcome, RawMessage};
use serde::{Deserialize, Serialize};

/// Account fields sent with every request. Holds exposed secrets and must
/// never be logged.
#[derive(Serialize)]
pub struct SessionFields<'a> {
    pub phone: &'a str,
    pub api_id: i64,
    pub api_hash: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<&'a str>,
}

/// `POST /v1/join` body.
#[derive(Serialize)]
pub struct JoinRequest<'a> {
    #[serde(flatten)]
    pub account: SessionFields<'a>,
    pub group: &'a str,
}

/// `POST /v1/messages` body.
#[derive(Serialize)]
pub struct MessagesRequest<'a> {
    #[serde(flatten)]
    pub account: SessionFields<'a>,
    pub group: &'a str,
    /// Only messages with a larger id are returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_id: Option<i64>,
    pub limit: u32,
}

/// Join result as reported by the bridge.
#[derive(Debug, Deserialize)]
pub struct JoinResponse {
    pub outcome: String,
    #[serde(default)]
    pub seconds: Option<u64>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl JoinResponse {
    pub fn into_outcome(self) -> JoinOutcome {
        match self.outcome.as_str() {
            "joined" => JoinOutcome::Joined,
            "already_member" => JoinOutcome::AlreadyMember,
            "flood_wait" => JoinOutcome::FloodWait {
                seconds: self.seconds.unwrap_or(0),
            },
            "invite_invalid" => JoinOutcome::InviteInvalid,
            "channel_full" => JoinOutcome::ChannelFull,
            "failed" => JoinOutcome::Failed {
                detail: self.detail.unwrap_or_else(|| "bridge reported failure".into()),
            },
            other => JoinOutcome::Failed {
                detail: format!("unknown bridge outcome `{other}`"),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<BridgeMessage>,
}

#[derive(Debug, Deserialize)]
pub struct BridgeMessage {
    pub id: i64,
    #[serde(default)]
    pub sender_id: Option<i64>,
    pub date: DateTime<Utc>,
    /// Media-only messages carry no text.
    #[serde(default)]
    pub text: Option<String>,
}

impl From<BridgeMessage> for RawMessage {
    fn from(m: BridgeMessage) -> Self {
        RawMessage {
            id: m.id,
            sender_id: m.sender_id,
            timestamp: m.date,
            text: m.text.unwrap_or_default(),
        }
    }
}

/// Body of a 420/429 response.
#[derive(Debug, Deserialize)]
pub struct FloodWaitBody {
    pub retry_after: u64,
}
