use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    Json,
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use cvi_backpressure::{RateDecision, RateLimiterStore};
use serde_json::json;
use tower::{Layer, Service, util::ServiceExt};
use tracing::warn;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Client key for rate limiting: the first forwarded address, else the
/// proxy-provided client address, else `unknown`.
pub fn client_key(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let ip = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("cf-connecting-ip"))
        .or_else(|| header("x-real-ip"))
        .unwrap_or("unknown");
    format!("ip:{ip}")
}

#[derive(Clone)]
pub struct RateLimitLayer {
    store: Arc<dyn RateLimiterStore>,
}

impl RateLimitLayer {
    pub fn new(store: Arc<dyn RateLimiterStore>) -> Self {
        Self { store }
    }
}

impl<S> Layer<S> for RateLimitLayer
where
    S: Service<Request<Body>, Response = Response> + Clone,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
{
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            store: self.store.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    store: Arc<dyn RateLimiterStore>,
}

impl<S> Service<Request<Body>> for RateLimitMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let key = client_key(req.headers());
        let store = self.store.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move {
            let decision = match store.check(&key).await {
                Ok(decision) => decision,
                Err(err) => {
                    warn!(error = %err, key = %key, "rate limiter unavailable, allowing request");
                    return inner.ready().await?.call(req).await;
                }
            };
            if !decision.allowed {
                return Ok(denied(&decision));
            }
            let mut response = inner.ready().await?.call(req).await?;
            apply_headers(response.headers_mut(), &decision);
            Ok(response)
        })
    }
}

fn denied(decision: &RateDecision) -> Response {
    let retry_after = decision.retry_after_secs.unwrap_or(1);
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "Too many requests",
            "retryAfter": retry_after,
            "remaining": decision.remaining,
            "resetTime": decision.reset_time_ms,
        })),
    )
        .into_response();
    let headers = response.headers_mut();
    apply_headers(headers, decision);
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_time_ms));
}
