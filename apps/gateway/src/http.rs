use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use cvi_backpressure::{FixedWindowLimiter, RateLimiterStore};
use cvi_client::{ConversationApi, ReqwestConversationApi};
use cvi_core::{EventDispatcher, EventSink, FileEventSink, Normalizer, TracingDispatcher};
use security::WebhookVerifier;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::rate::RateLimitLayer;
use crate::{admin, conversation, reqid, respond, webhook};

/// Shared handler state. Every collaborator is injected so tests can swap it.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub verifier: Arc<WebhookVerifier>,
    pub normalizer: Arc<Normalizer>,
    pub sink: Arc<dyn EventSink>,
    pub event_log: FileEventSink,
    pub dispatcher: Arc<dyn EventDispatcher>,
    pub provider: Option<Arc<dyn ConversationApi>>,
    pub limiter: Arc<dyn RateLimiterStore>,
}

impl AppState {
    /// State with local defaults and no provider client.
    pub fn new(config: GatewayConfig) -> Self {
        let verifier = WebhookVerifier::new(
            config.webhook_secret.clone(),
            config.deployment,
            config.policy,
        );
        let event_log = FileEventSink::new(&config.events_dir);
        let limiter = FixedWindowLimiter::new(config.rate_limits);
        Self {
            verifier: Arc::new(verifier),
            normalizer: Arc::new(Normalizer::default()),
            sink: Arc::new(event_log.clone()),
            event_log,
            dispatcher: Arc::new(TracingDispatcher),
            provider: None,
            limiter: Arc::new(limiter),
            config: Arc::new(config),
        }
    }

    /// Production wiring: adds the provider client when an API key is configured.
    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        let provider = match config.api_key.as_deref() {
            Some(key) => {
                let client = reqwest::Client::builder()
                    .user_agent(concat!("cvi-gateway/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .context("building provider HTTP client")?;
                let api = ReqwestConversationApi::new(client, &config.api_base, key)
                    .with_context(|| format!("invalid TAVUS_API_BASE {}", config.api_base))?;
                Some(Arc::new(api) as Arc<dyn ConversationApi>)
            }
            None => {
                warn!("TAVUS_API_KEY not set; conversation creation disabled");
                None
            }
        };
        if config.webhook_secret.is_none() {
            warn!(
                deployment = ?config.deployment,
                "TAVUS_WEBHOOK_SECRET not set; webhook signatures cannot be verified"
            );
        }
        let mut state = Self::new(config);
        state.provider = provider;
        Ok(state)
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn ConversationApi>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<dyn RateLimiterStore>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(respond::health))
        .route("/api/tavus/webhook", post(webhook::callback))
        .route("/api/tavus/webhook/conversation", post(webhook::conversation))
        .route("/api/tavus/webhook/video", post(webhook::video))
        .route(
            "/api/tavus/create-conversation",
            post(conversation::create).layer(RateLimitLayer::new(state.limiter.clone())),
        );

    if state.config.admin.is_some() {
        router = router.route("/api/admin/webhook-events", get(admin::webhook_events));
    } else {
        info!("admin event viewer disabled; TAVUS_WEBHOOK_BASIC_USER/PASS not set");
    }

    router
        .layer(middleware::from_fn(respond::security_headers))
        .layer(middleware::from_fn(reqid::with_request_id))
        .with_state(state)
}
