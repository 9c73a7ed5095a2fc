use std::time::Duration;

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use cvi_client::ProviderError;
use security::VerifyError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("unauthorized: {0}")]
    Unauthorized(VerifyError),
    #[error("{0}")]
    BadRequest(String),
    #[error("service misconfigured: {0}")]
    Configuration(String),
    #[error("provider error")]
    Provider(#[from] ProviderError),
    #[error("internal server error")]
    Internal(#[source] anyhow::Error),
}

impl From<VerifyError> for GatewayError {
    fn from(err: VerifyError) -> Self {
        if err.is_configuration() {
            GatewayError::Configuration(err.to_string())
        } else {
            GatewayError::Unauthorized(err)
        }
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Provider(ProviderError::Remote { status, .. }) => {
                if *status == StatusCode::TOO_MANY_REQUESTS {
                    StatusCode::SERVICE_UNAVAILABLE
                } else if status.is_server_error() {
                    StatusCode::BAD_GATEWAY
                } else {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
            }
            GatewayError::Provider(ProviderError::Config(_)) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Provider(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::Provider(ProviderError::Remote {
                status,
                retry_after,
                ..
            }) if *status == StatusCode::TOO_MANY_REQUESTS => {
                Some(retry_after.unwrap_or(Duration::from_secs(1)))
            }
            _ => None,
        }
    }

    fn message(&self) -> String {
        match self {
            GatewayError::Unauthorized(VerifyError::StaleTimestamp) => {
                "Webhook timestamp outside the accepted window".into()
            }
            GatewayError::Unauthorized(_) => "Invalid webhook signature".into(),
            GatewayError::Configuration(_) => "Service temporarily unavailable".into(),
            GatewayError::Provider(ProviderError::Remote { status, .. })
                if *status == StatusCode::TOO_MANY_REQUESTS =>
            {
                "Conversation service is busy, please retry".into()
            }
            GatewayError::Provider(ProviderError::Remote { status, message, .. })
                if status.is_client_error() =>
            {
                if message.is_empty() {
                    "Conversation service rejected the request".into()
                } else {
                    message.clone()
                }
            }
            GatewayError::Provider(ProviderError::Config(_)) => {
                "Service temporarily unavailable".into()
            }
            GatewayError::Provider(_) => "Failed to create conversation".into(),
            GatewayError::Internal(_) => "internal server error".into(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorBody {
            error: self.message(),
        });
        let mut response = (status, body).into_response();
        if let Some(retry_after) = self.retry_after() {
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
