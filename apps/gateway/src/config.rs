use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use cvi_backpressure::RateLimits;
use cvi_client::DEFAULT_API_BASE;
use security::{AdminCredentials, DEFAULT_MAX_AGE_SECS, Deployment, VerificationPolicy};

pub const DEFAULT_VERTICAL: &str = "GENERAL";
pub const CALLBACK_PATH: &str = "/api/tavus/webhook";

/// Persona/replica pair backing one vertical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerticalConfig {
    pub persona_id: String,
    pub replica_id: String,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub addr: SocketAddr,
    pub deployment: Deployment,
    pub webhook_secret: Option<String>,
    pub signature_header: String,
    pub timestamp_header: String,
    pub policy: VerificationPolicy,
    pub events_dir: PathBuf,
    pub api_key: Option<String>,
    pub api_base: String,
    pub public_base_url: String,
    pub verticals: HashMap<String, VerticalConfig>,
    pub rate_limits: RateLimits,
    pub sweep_interval: Duration,
    pub admin: Option<AdminCredentials>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Builds the configuration from an explicit set of variables.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let addr = get("BIND")
            .unwrap_or_else(|| "0.0.0.0:3000".into())
            .parse::<SocketAddr>()
            .context("invalid BIND address")?;
        let deployment = get("DEPLOYMENT_ENV")
            .map(|v| Deployment::parse(&v))
            .unwrap_or(Deployment::Development);

        let policy = VerificationPolicy {
            enforce_in_dev: flag(get("WEBHOOK_ENFORCE_IN_DEV")),
            require_timestamp: flag(get("WEBHOOK_REQUIRE_TIMESTAMP")),
            max_age_secs: match get("WEBHOOK_MAX_AGE_SECS") {
                Some(raw) => raw.parse().context("invalid WEBHOOK_MAX_AGE_SECS")?,
                None => DEFAULT_MAX_AGE_SECS,
            },
        };

        let sweep_interval = match get("RATE_LIMIT_SWEEP_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .context("invalid RATE_LIMIT_SWEEP_SECS")?
                    .max(1),
            ),
            None => Duration::from_secs(60),
        };

        let admin = match (
            get("TAVUS_WEBHOOK_BASIC_USER"),
            get("TAVUS_WEBHOOK_BASIC_PASS"),
        ) {
            (Some(user), Some(pass)) => Some(AdminCredentials::new(user, pass)),
            _ => None,
        };

        let public_base_url = get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| "http://localhost:3000".into())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            addr,
            deployment,
            webhook_secret: get("TAVUS_WEBHOOK_SECRET"),
            signature_header: get("WEBHOOK_SIGNATURE_HEADER")
                .unwrap_or_else(|| "x-tavus-signature".into())
                .to_ascii_lowercase(),
            timestamp_header: get("WEBHOOK_TIMESTAMP_HEADER")
                .unwrap_or_else(|| "x-tavus-timestamp".into())
                .to_ascii_lowercase(),
            policy,
            events_dir: get("EVENTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("diagnostics").join("events")),
            api_key: get("TAVUS_API_KEY"),
            api_base: get("TAVUS_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.into()),
            public_base_url,
            verticals: verticals(&vars),
            rate_limits: RateLimits::from_lookup(|key| get(key)),
            sweep_interval,
            admin,
        })
    }

    /// Looks up a vertical by name, case-insensitively.
    pub fn vertical(&self, name: &str) -> Option<&VerticalConfig> {
        self.verticals.get(&name.trim().to_ascii_uppercase())
    }

    pub fn callback_url(&self) -> String {
        format!("{}{CALLBACK_PATH}", self.public_base_url)
    }
}

fn flag(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

fn verticals(vars: &HashMap<String, String>) -> HashMap<String, VerticalConfig> {
    const PERSONA_PREFIX: &str = "TAVUS_PERSONA_ID_";
    const REPLICA_PREFIX: &str = "TAVUS_REPLICA_ID_";

    vars.iter()
        .filter_map(|(key, persona)| {
            let name = key.strip_prefix(PERSONA_PREFIX)?;
            let replica = vars.get(&format!("{REPLICA_PREFIX}{name}"))?;
            let (persona, replica) = (persona.trim(), replica.trim());
            if name.is_empty() || persona.is_empty() || replica.is_empty() {
                return None;
            }
            Some((
                name.to_ascii_uppercase(),
                VerticalConfig {
                    persona_id: persona.to_string(),
                    replica_id: replica.to_string(),
                },
            ))
        })
        .collect()
}
