//! HTTP Basic credentials for the admin event viewer.

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use subtle::ConstantTimeEq;

pub const ADMIN_CHALLENGE: &str = "Basic realm=\"Webhook Admin Panel\"";

#[derive(Clone)]
pub struct AdminCredentials {
    user: String,
    pass: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

impl AdminCredentials {
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            pass: pass.into(),
        }
    }

    /// Validates an `Authorization` header value.
    pub fn check(&self, authorization: Option<&str>) -> bool {
        let Some(encoded) = authorization
            .and_then(|value| value.trim().strip_prefix("Basic "))
            .map(str::trim)
        else {
            return false;
        };
        let Ok(decoded) = B64.decode(encoded) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        let Some((user, pass)) = decoded.split_once(':') else {
            return false;
        };
        let user_ok = user.as_bytes().ct_eq(self.user.as_bytes());
        let pass_ok = pass.as_bytes().ct_eq(self.pass.as_bytes());
        (user_ok & pass_ok).into()
    }
}
