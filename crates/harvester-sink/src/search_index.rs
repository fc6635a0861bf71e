// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Search-indexed document store sink.
//!
//! Each record is `PUT` as a JSON document to
//! `{url}/{prefix}_{kind}/_doc/{document_id}`. Document ids are deterministic
//! (`{group}:{message}` for messages), so replaying a record overwrites the
//! existing document instead of duplicating it.

use std::time::Duration;

use async_trait::async_trait;
use harvester_config::model::SearchIndexConfig;
use harvester_core::{HarvesterError, Record, StorageSink};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

const SINK_NAME: &str = "search_index";

/// HTTP client for an Elasticsearch-compatible document API.
pub struct SearchIndexSink {
    client: reqwest::Client,
    base_url: Url,
    index_prefix: String,
    username: Option<String>,
    password: Option<SecretString>,
}

impl SearchIndexSink {
    pub fn new(base_url: &str, index_prefix: &str, timeout: Duration) -> Result<Self, HarvesterError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| HarvesterError::Config(format!("invalid search index url {base_url}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HarvesterError::Sink {
                sink: SINK_NAME.to_string(),
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            base_url,
            index_prefix: index_prefix.to_string(),
            username: None,
            password: None,
        })
    }

    pub fn from_config(config: &SearchIndexConfig) -> Result<Self, HarvesterError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| HarvesterError::Config("sinks.search_index.url is not set".into()))?;
        let mut sink = Self::new(url, &config.index_prefix, Duration::from_secs(config.timeout_secs))?;
        if let Some(username) = &config.username {
            sink = sink.with_basic_auth(username, config.password.clone());
        }
        Ok(sink)
    }

    pub fn with_basic_auth(mut self, username: &str, password: Option<String>) -> Self {
        self.username = Some(username.to_string());
        self.password = password.map(SecretString::from);
        self
    }

    /// Document URL for a record. Every path segment is percent-encoded, so
    /// group links containing `/` stay inside one segment.
    pub fn document_url(&self, record: &Record) -> Result<Url, HarvesterError> {
        let index = format!("{}_{}", self.index_prefix, record.kind());
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| HarvesterError::Config(format!("search index url {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend([index.as_str(), "_doc", record.document_id().as_str()]);
        Ok(url)
    }
}

#[async_trait]
impl StorageSink for SearchIndexSink {
    fn name(&self) -> &str {
        SINK_NAME
    }

    async fn append(&self, record: &Record) -> Result<(), HarvesterError> {
        let url = self.document_url(record)?;
        let mut request = self.client.put(url.clone()).json(record);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref().map(|p| p.expose_secret()));
        }

        let response = request.send().await.map_err(|e| HarvesterError::Sink {
            sink: SINK_NAME.to_string(),
            message: format!("request to {url} failed: {e}"),
            source: Some(Box::new(e)),
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(kind = %record.kind(), id = %record.document_id(), "indexed document");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(HarvesterError::sink(
            SINK_NAME,
            format!("index returned {status}: {body}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use harvester_core::{GroupId, Message};
    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> Record {
        Record::Message(Message {
            group_id: GroupId::from_reference("rustjobs"),
            message_id: 42,
            sender_id: None,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            text: "hiring".into(),
            classification: None,
        })
    }

    #[test]
    fn document_url_encodes_group_links() {
        let sink = SearchIndexSink::new("http://localhost:9200/", "crawl", Duration::from_secs(1)).unwrap();
        let mut record = message();
        if let Record::Message(m) = &mut record {
            m.group_id = GroupId::from_reference("https://t.me/rustjobs");
        }
        let url = sink.document_url(&record).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9200/crawl_message/_doc/https:%2F%2Ft.me%2Frustjobs:42"
        );
    }

    #[tokio::test]
    async fn puts_record_under_deterministic_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/harvester_message/_doc/rustjobs:42"))
            .and(body_partial_json(serde_json::json!({"message_id": 42, "text": "hiring"})))
            .respond_with(ResponseTemplate::new(201))
            .expect(2)
            .mount(&server)
            .await;

        let sink = SearchIndexSink::new(&server.uri(), "harvester", Duration::from_secs(5)).unwrap();
        sink.append(&message()).await.unwrap();
        // A replay overwrites the same document.
        sink.append(&message()).await.unwrap();
    }

    #[tokio::test]
    async fn sends_basic_auth_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = SearchIndexConfig {
            enabled: true,
            url: Some(server.uri()),
            username: Some("elastic".into()),
            password: Some("changeme".into()),
            ..SearchIndexConfig::default()
        };
        let sink = SearchIndexSink::from_config(&config).unwrap();
        sink.append(&message()).await.unwrap();
    }

    #[tokio::test]
    async fn error_status_is_a_sink_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let sink = SearchIndexSink::new(&server.uri(), "harvester", Duration::from_secs(5)).unwrap();
        let err = sink.append(&message()).await.unwrap_err();
        match err {
            HarvesterError::Sink { sink, message, .. } => {
                assert_eq!(sink, "search_index");
                assert!(message.contains("503"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_url_is_a_config_error() {
        let err = SearchIndexSink::from_config(&SearchIndexConfig::default()).err().unwrap();
        assert!(matches!(err, HarvesterError::Config(_)));
    }
}
