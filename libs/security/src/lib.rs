//! Authentication for inbound webhook deliveries and the admin surface.
//!
//! * [`signature`] signs and verifies raw bodies with HMAC-SHA256.
//! * [`replay`] rejects deliveries whose timestamp is outside the accepted window.
//! * [`policy`] combines both behind [`WebhookVerifier`], including the explicit
//!   development bypass when no secret is configured.
//! * [`basic_auth`] guards the admin event viewer.

pub mod basic_auth;
pub mod policy;
pub mod replay;
pub mod signature;

pub use basic_auth::{ADMIN_CHALLENGE, AdminCredentials};
pub use policy::{
    Deployment, RawWebhookRequest, VerificationPolicy, Verified, VerifyError, WebhookVerifier,
};
pub use replay::{DEFAULT_MAX_AGE_SECS, Timestamp, verify_timestamp, verify_timestamp_at};
pub use signature::{sign, verify};
