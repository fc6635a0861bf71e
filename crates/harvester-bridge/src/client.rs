// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the session bridge.
//!
//! Status mapping:
//!
//! | Bridge response          | Result                                        |
//! |--------------------------|-----------------------------------------------|
//! | 2xx                      | parsed body                                   |
//! | 401 / 403                | [`HarvesterError::Auth`]                      |
//! | 420 / 429 + retry_after  | [`HarvesterError::FloodWait`] (join: outcome) |
//! | 404                      | [`HarvesterError::InvalidTarget`] (join: `InviteInvalid`) |
//! | 5xx, connection errors   | [`HarvesterError::Transient`]                 |
//! | anything else            | [`HarvesterError::Internal`]                  |

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use harvester_config::model::{AccountConfig, NetworkConfig};
use harvester_core::{Account, HarvesterError, JoinOutcome, NetworkClient, RawMessage};
use reqwest::{Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::types::{
    FloodWaitBody, JoinRequest, JoinResponse, MessagesRequest, MessagesResponse, SessionFields,
};

/// Status code some platforms use for flood waits.
const ENHANCE_YOUR_CALM: u16 = 420;

/// Network client backed by the session bridge.
///
/// Each account is pinned to one egress path: with proxies configured,
/// account `i` (configuration order) uses `proxies[i % proxies.len()]`.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    /// One client per egress path; a single direct client without proxies.
    clients: Vec<reqwest::Client>,
    /// Account name to index into `clients`.
    egress: HashMap<String, usize>,
    base_url: String,
    timeout: Duration,
}

impl BridgeClient {
    /// Direct client without proxies.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, HarvesterError> {
        Ok(Self {
            clients: vec![build_client(None, timeout)?],
            egress: HashMap::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(network: &NetworkConfig, accounts: &[AccountConfig]) -> Result<Self, HarvesterError> {
        let base_url = network
            .bridge_url
            .as_deref()
            .ok_or_else(|| HarvesterError::Config("network.bridge_url is not set".into()))?;
        let timeout = Duration::from_secs(network.timeout_secs);
        let mut client = Self::new(base_url, timeout)?;
        if !network.proxies.is_empty() {
            let names: Vec<&str> = accounts.iter().map(|a| a.name.as_str()).collect();
            client = client.with_proxies(&network.proxies, &names)?;
        }
        Ok(client)
    }

    /// Pins `accounts[i]` to `proxies[i % proxies.len()]`.
    pub fn with_proxies(mut self, proxies: &[String], accounts: &[&str]) -> Result<Self, HarvesterError> {
        if proxies.is_empty() {
            return Ok(self);
        }
        self.clients = proxies
            .iter()
            .map(|p| build_client(Some(p), self.timeout))
            .collect::<Result<_, _>>()?;
        self.egress = accounts
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i % proxies.len()))
            .collect();
        Ok(self)
    }

    /// Egress index used for `account`. Unknown accounts use the first path.
    pub fn egress_index(&self, account: &str) -> usize {
        self.egress.get(account).copied().unwrap_or(0)
    }

    fn client_for(&self, account: &str) -> &reqwest::Client {
        let index = self.egress_index(account);
        // `clients` is never empty.
        &self.clients[index.min(self.clients.len() - 1)]
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        account: &Account,
        group: &str,
        body: &B,
    ) -> Result<T, HarvesterError> {
        let url = format!("{}{endpoint}", self.base_url);
        let response = self
            .client_for(&account.name)
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HarvesterError::Timeout {
                        duration: self.timeout,
                    }
                } else {
                    HarvesterError::Transient {
                        message: format!("bridge request to {endpoint} failed: {e}"),
                        source: Some(Box::new(e)),
                    }
                }
            })?;

        let response = check_status(response, account, group).await?;
        response.json::<T>().await.map_err(|e| HarvesterError::Internal(format!(
            "malformed bridge response from {endpoint}: {e}"
        )))
    }
}

fn build_client(proxy: Option<&str>, timeout: Duration) -> Result<reqwest::Client, HarvesterError> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| HarvesterError::Config(format!("invalid proxy {proxy}: {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder.build().map_err(|e| HarvesterError::Internal(format!(
        "failed to build HTTP client: {e}"
    )))
}

fn session_fields(account: &Account) -> SessionFields<'_> {
    let credentials = &account.credentials;
    SessionFields {
        phone: &account.phone,
        api_id: credentials.api_id,
        api_hash: credentials.api_hash.expose_secret(),
        session: credentials.session.as_ref().map(|s| s.expose_secret()),
    }
}

/// Maps a non-success bridge status onto the error taxonomy.
async fn check_status(response: Response, account: &Account, group: &str) -> Result<Response, HarvesterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_header = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HarvesterError::Auth {
            account: account.name.clone(),
            message: format!("bridge returned {status}"),
        }),
        s if s == StatusCode::TOO_MANY_REQUESTS || s.as_u16() == ENHANCE_YOUR_CALM => {
            let seconds = serde_json::from_str::<FloodWaitBody>(&body)
                .map(|b| b.retry_after)
                .ok()
                .or(retry_header);
            match seconds {
                Some(seconds) => Err(HarvesterError::FloodWait { seconds }),
                None => {
                    warn!(%status, "rate limited without a retry_after");
                    Err(HarvesterError::transient(format!("bridge returned {status}")))
                }
            }
        }
        StatusCode::NOT_FOUND => Err(HarvesterError::InvalidTarget {
            target: group.to_string(),
            message: body,
        }),
        s if s.is_server_error() => Err(HarvesterError::transient(format!(
            "bridge returned {status}: {body}"
        ))),
        _ => Err(HarvesterError::Internal(format!("bridge returned {status}: {body}"))),
    }
}

#[async_trait]
impl NetworkClient for BridgeClient {
    fn name(&self) -> &str {
        "bridge"
    }

    async fn join(&self, group_ref: &str, account: &Account) -> Result<JoinOutcome, HarvesterError> {
        let request = JoinRequest {
            account: session_fields(account),
            group: group_ref,
        };
        match self
            .post::<_, JoinResponse>("/v1/join", account, group_ref, &request)
            .await
        {
            Ok(response) => {
                let outcome = response.into_outcome();
                debug!(group = group_ref, account = %account.name, ?outcome, "bridge join");
                Ok(outcome)
            }
            Err(HarvesterError::FloodWait { seconds }) => Ok(JoinOutcome::FloodWait { seconds }),
            Err(HarvesterError::InvalidTarget { .. }) => Ok(JoinOutcome::InviteInvalid),
            Err(e) => Err(e),
        }
    }

    async fn fetch_messages(
        &self,
        group_ref: &str,
        account: &Account,
        cursor: Option<i64>,
        limit: u32,
    ) -> Result<Vec<RawMessage>, HarvesterError> {
        let request = MessagesRequest {
            account: session_fields(account),
            group: group_ref,
            min_id: cursor,
            limit,
        };
        let response: MessagesResponse = self
            .post("/v1/messages", account, group_ref, &request)
            .await?;
        debug!(group = group_ref, account = %account.name, count = response.messages.len(), "bridge fetch");
        Ok(response.messages.into_iter().map(RawMessage::from).collect())
    }
}
