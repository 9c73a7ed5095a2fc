//! Client for the gateway's own create-conversation endpoint.

use http::StatusCode;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::retry_after;
use crate::retry::{Classify, Disposition};

pub const CREATE_CONVERSATION_PATH: &str = "api/tavus/create-conversation";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub conversation_id: String,
    pub conversation_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "retryAfter")]
    retry_after: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("gateway client configuration error: {0}")]
    Config(anyhow::Error),
    #[error("could not reach the gateway")]
    Transport(#[source] reqwest::Error),
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64, message: String },
    #[error("gateway returned {status}: {message}")]
    Remote { status: StatusCode, message: String },
    #[error("unexpected gateway response")]
    Decode(#[source] reqwest::Error),
}

impl ClientError {
    /// Text suitable for showing to the person who asked to open a conversation.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::RateLimited { retry_after_secs, .. } => format!(
                "Too many requests. Please wait {retry_after_secs} seconds and try again."
            ),
            ClientError::Transport(_) => {
                "Network error. Please check your connection and try again.".into()
            }
            ClientError::Remote { status, message }
                if *status == StatusCode::BAD_REQUEST && message.contains("configuration") =>
            {
                "Video chat is not properly configured. Please contact support.".into()
            }
            ClientError::Remote { status, .. } if status.is_server_error() => {
                "Server error. Please try again later.".into()
            }
            ClientError::Remote { message, .. } if !message.is_empty() => message.clone(),
            ClientError::Remote { .. } => "Invalid request. Please contact support.".into(),
            ClientError::Config(_) | ClientError::Decode(_) => {
                "Unable to start video chat. Please contact support.".into()
            }
        }
    }
}

impl Classify for ClientError {
    fn disposition(&self) -> Disposition {
        match self {
            ClientError::RateLimited { .. } | ClientError::Transport(_) => Disposition::Retryable,
            ClientError::Remote { status, .. } if status.is_server_error() => {
                Disposition::Retryable
            }
            ClientError::Remote { .. } | ClientError::Config(_) | ClientError::Decode(_) => {
                Disposition::Fatal
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: Url,
}

impl GatewayClient {
    pub fn new(client: Client, base_url: &str) -> Result<Self, ClientError> {
        let mut url = Url::parse(base_url).map_err(|err| ClientError::Config(err.into()))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url: url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn create_conversation(
        &self,
        request: &LaunchRequest,
    ) -> Result<ConversationSession, ClientError> {
        let url = self
            .base_url
            .join(CREATE_CONVERSATION_PATH)
            .map_err(|err| ClientError::Config(err.into()))?;
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(ClientError::Transport)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<ConversationSession>()
                .await
                .map_err(ClientError::Decode);
        }

        let header_retry = retry_after(response.headers()).map(|d| d.as_secs());
        let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
            error: None,
            retry_after: None,
        });
        let message = body.error.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = body.retry_after.or(header_retry).unwrap_or(1).max(1);
            return Err(ClientError::RateLimited {
                retry_after_secs,
                message,
            });
        }
        Err(ClientError::Remote { status, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_request_uses_camel_case() {
        let request = LaunchRequest {
            vertical: Some("healthcare".into()),
            document_tags: Some(vec!["faq".into()]),
            memory_key: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"vertical": "healthcare", "documentTags": ["faq"]})
        );
    }

    #[test]
    fn classification_and_messages() {
        let limited = ClientError::RateLimited {
            retry_after_secs: 12,
            message: "Too many requests".into(),
        };
        assert!(limited.is_retryable());
        assert!(limited.user_message().contains("12 seconds"));

        let misconfigured = ClientError::Remote {
            status: StatusCode::BAD_REQUEST,
            message: "Invalid vertical configuration".into(),
        };
        assert!(!misconfigured.is_retryable());
        assert!(misconfigured.user_message().contains("contact support"));

        let upstream = ClientError::Remote {
            status: StatusCode::BAD_GATEWAY,
            message: "provider unavailable".into(),
        };
        assert!(upstream.is_retryable());
        assert!(upstream.user_message().contains("try again"));
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let client = GatewayClient::new(Client::new(), "http://localhost:3000/app").unwrap();
        assert_eq!(
            client.base_url().join(CREATE_CONVERSATION_PATH).unwrap().as_str(),
            "http://localhost:3000/app/api/tavus/create-conversation"
        );
    }
}
