//! Verification policy for inbound webhook deliveries.

use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{error, warn};

use crate::replay::{DEFAULT_MAX_AGE_SECS, Timestamp, verify_timestamp_at};
use crate::signature;

/// One inbound delivery as received, before any parsing.
#[derive(Debug, Clone, Default)]
pub struct RawWebhookRequest {
    pub body: Bytes,
    pub signature_header: Option<String>,
    pub timestamp_header: Option<String>,
}

impl RawWebhookRequest {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature_header = Some(signature.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp_header = Some(timestamp.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    Production,
    Development,
}

impl Deployment {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Deployment::Production,
            _ => Deployment::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Deployment::Production)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationPolicy {
    /// Reject unsigned deliveries even outside production when no secret is set.
    pub enforce_in_dev: bool,
    /// Reject deliveries that carry no timestamp header.
    pub require_timestamp: bool,
    pub max_age_secs: u64,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            enforce_in_dev: false,
            require_timestamp: false,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verified {
    Signed,
    /// No secret configured in a development deployment.
    Bypassed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("webhook secret not configured")]
    MissingSecret,
    #[error("missing webhook signature")]
    MissingSignature,
    #[error("invalid webhook signature")]
    BadSignature,
    #[error("missing webhook timestamp")]
    MissingTimestamp,
    #[error("malformed webhook timestamp")]
    MalformedTimestamp,
    #[error("webhook timestamp outside the accepted window")]
    StaleTimestamp,
}

impl VerifyError {
    /// Configuration problems are the operator's fault, not the sender's.
    pub fn is_configuration(&self) -> bool {
        matches!(self, VerifyError::MissingSecret)
    }
}

#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    deployment: Deployment,
    policy: VerificationPolicy,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>, deployment: Deployment, policy: VerificationPolicy) -> Self {
        Self {
            secret: secret.filter(|s| !s.trim().is_empty()),
            deployment,
            policy,
        }
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn check(&self, request: &RawWebhookRequest) -> Result<Verified, VerifyError> {
        self.check_at(request, OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn check_at(
        &self,
        request: &RawWebhookRequest,
        now_secs: i64,
    ) -> Result<Verified, VerifyError> {
        let Some(secret) = self.secret.as_deref() else {
            if !self.deployment.is_production() && !self.policy.enforce_in_dev {
                warn!("webhook verification bypassed: no secret configured outside production");
                return Ok(Verified::Bypassed);
            }
            error!(
                deployment = ?self.deployment,
                "webhook secret not configured; refusing delivery"
            );
            return Err(VerifyError::MissingSecret);
        };

        let signature = request
            .signature_header
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(VerifyError::MissingSignature)?;
        if !signature::verify(&request.body, Some(signature), secret) {
            return Err(VerifyError::BadSignature);
        }

        match request.timestamp_header.as_deref() {
            Some(raw) => {
                if Timestamp::Text(raw).unix_seconds().is_none() {
                    return Err(VerifyError::MalformedTimestamp);
                }
                if !verify_timestamp_at(raw, self.policy.max_age_secs, now_secs) {
                    return Err(VerifyError::StaleTimestamp);
                }
            }
            None if self.policy.require_timestamp => return Err(VerifyError::MissingTimestamp),
            None => {}
        }

        Ok(Verified::Signed)
    }
}
