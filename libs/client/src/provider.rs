use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::StatusCode;
use metrics::{counter, histogram};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::retry::{Classify, Disposition};

pub const DEFAULT_API_BASE: &str = "https://tavusapi.com/v2";
const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationProperties {
    pub language: String,
    pub enable_transcription: bool,
}

impl Default for ConversationProperties {
    fn default() -> Self {
        Self {
            language: "multilingual".into(),
            enable_transcription: true,
        }
    }
}

/// Body of the provider's conversation-creation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    pub persona_id: String,
    pub replica_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_stores: Option<Vec<String>>,
    pub callback_url: String,
    #[serde(default)]
    pub properties: ConversationProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConversationCreated {
    pub conversation_id: String,
    pub conversation_url: String,
}

#[async_trait]
pub trait ConversationApi: Send + Sync {
    async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<ConversationCreated, ProviderError>;
}

pub struct ReqwestConversationApi {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl ReqwestConversationApi {
    pub fn new(client: Client, base_url: &str, api_key: &str) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Config(anyhow::anyhow!(
                "provider API key is not configured"
            )));
        }
        let mut url = Url::parse(base_url).map_err(|err| ProviderError::Config(err.into()))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url: url,
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|err| ProviderError::Config(err.into()))
    }
}

#[async_trait]
impl ConversationApi for ReqwestConversationApi {
    async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<ConversationCreated, ProviderError> {
        let url = self.endpoint("conversations")?;
        let started = Instant::now();
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|err| {
                counter!(
                    "provider_errors_total",
                    "kind" => "transport",
                    "endpoint" => "conversations.create"
                )
                .increment(1);
                ProviderError::Transport(err)
            })?;

        let status_label = response.status().as_str().to_string();
        histogram!(
            "provider_roundtrip_seconds",
            "endpoint" => "conversations.create",
            "status" => status_label
        )
        .record(started.elapsed().as_secs_f64());

        map_response("conversations.create", response).await
    }
}

async fn map_response<T>(
    endpoint: &'static str,
    response: reqwest::Response,
) -> Result<T, ProviderError>
where
    T: for<'de> Deserialize<'de>,
{
    let status = response.status();
    if !status.is_success() {
        let status_label = status.as_str().to_string();
        let retry_after = retry_after(response.headers());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable>".into());
        counter!(
            "provider_errors_total",
            "kind" => "remote",
            "endpoint" => endpoint,
            "status" => status_label
        )
        .increment(1);
        return Err(ProviderError::Remote {
            status,
            retry_after,
            message: truncate(body, 512),
        });
    }

    response.json::<T>().await.map_err(|err| {
        counter!(
            "provider_errors_total",
            "kind" => "decode",
            "endpoint" => endpoint
        )
        .increment(1);
        ProviderError::Decode(err.into())
    })
}

/// Reads a delta-seconds `Retry-After` header.
pub fn retry_after(headers: &http::HeaderMap) -> Option<Duration> {
    headers
        .get(http::header::RETRY_AFTER)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider configuration error: {0}")]
    Config(anyhow::Error),
    #[error("provider transport error")]
    Transport(#[source] reqwest::Error),
    #[error("provider remote error (status {status}, retry_after = {retry_after:?})")]
    Remote {
        status: StatusCode,
        retry_after: Option<Duration>,
        message: String,
    },
    #[error("provider response decode error")]
    Decode(anyhow::Error),
}

impl Classify for ProviderError {
    fn disposition(&self) -> Disposition {
        match self {
            ProviderError::Transport(_) => Disposition::Retryable,
            ProviderError::Remote { status, .. }
                if *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() =>
            {
                Disposition::Retryable
            }
            ProviderError::Remote { .. } | ProviderError::Config(_) | ProviderError::Decode(_) => {
                Disposition::Fatal
            }
        }
    }
}

/// Scripted [`ConversationApi`] that records every request it receives.
pub struct MockConversationApi {
    pub requests: Mutex<Vec<CreateConversationRequest>>,
    responses: Mutex<VecDeque<Result<ConversationCreated, ProviderError>>>,
}

impl MockConversationApi {
    pub fn new(responses: Vec<Result<ConversationCreated, ProviderError>>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(responses.into()),
        }
    }

    pub fn succeeding(conversation_id: &str, conversation_url: &str) -> Self {
        Self::new(vec![Ok(ConversationCreated {
            conversation_id: conversation_id.into(),
            conversation_url: conversation_url.into(),
        })])
    }
}

#[async_trait]
impl ConversationApi for MockConversationApi {
    async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<ConversationCreated, ProviderError> {
        self.requests.lock().await.push(request.clone());
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Config(anyhow::anyhow!("no scripted response"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote(status: u16) -> ProviderError {
        ProviderError::Remote {
            status: StatusCode::from_u16(status).unwrap(),
            retry_after: None,
            message: String::new(),
        }
    }

    #[test]
    fn classification_follows_status() {
        assert_eq!(remote(429).disposition(), Disposition::Retryable);
        assert_eq!(remote(500).disposition(), Disposition::Retryable);
        assert_eq!(remote(503).disposition(), Disposition::Retryable);
        assert_eq!(remote(400).disposition(), Disposition::Fatal);
        assert_eq!(remote(404).disposition(), Disposition::Fatal);
        assert_eq!(
            ProviderError::Decode(anyhow::anyhow!("bad json")).disposition(),
            Disposition::Fatal
        );
    }

    #[test]
    fn request_body_skips_absent_options() {
        let request = CreateConversationRequest {
            persona_id: "p1".into(),
            replica_id: "r1".into(),
            document_tags: None,
            memory_stores: Some(vec!["mem-1".into()]),
            callback_url: "http://localhost:3000/api/tavus/webhook".into(),
            properties: ConversationProperties::default(),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "persona_id": "p1",
                "replica_id": "r1",
                "memory_stores": ["mem-1"],
                "callback_url": "http://localhost:3000/api/tavus/webhook",
                "properties": {"language": "multilingual", "enable_transcription": true}
            })
        );
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let err = ReqwestConversationApi::new(Client::new(), DEFAULT_API_BASE, " ").err();
        assert!(matches!(err, Some(ProviderError::Config(_))));
    }

    #[test]
    fn base_path_is_preserved() {
        let api = ReqwestConversationApi::new(Client::new(), DEFAULT_API_BASE, "key").unwrap();
        assert_eq!(
            api.endpoint("conversations").unwrap().as_str(),
            "https://tavusapi.com/v2/conversations"
        );
    }

    #[test]
    fn retry_after_parses_delta_seconds() {
        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert(http::header::RETRY_AFTER, "soon".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundary() {
        let body = "é".repeat(400);
        let cut = truncate(body, 511);
        assert_eq!(cut.len(), 510);
    }
}
