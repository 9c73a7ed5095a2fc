//! Per-client rate limiting for costly outbound calls.
//!
//! [`FixedWindowLimiter`] grants at most `capacity` requests per key per window.
//! Callers hold it as an `Arc<dyn RateLimiterStore>` so a shared store can
//! replace the in-process map without touching call sites.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use cvi_telemetry::{TelemetryLabels, record_counter, record_gauge};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, warn};

static RATE_LIMIT_RPM_ENV: &str = "RATE_LIMIT_RPM";
static RATE_LIMIT_WINDOW_ENV: &str = "RATE_LIMIT_WINDOW_MS";

pub const DEFAULT_CAPACITY: u32 = 5;
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(60_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub capacity: u32,
    pub window: Duration,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            window: DEFAULT_WINDOW,
        }
    }
}

impl RateLimits {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let capacity = parse_setting(&lookup, RATE_LIMIT_RPM_ENV).unwrap_or(defaults.capacity);
        let window = parse_setting::<u64>(&lookup, RATE_LIMIT_WINDOW_ENV)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.window);
        Self { capacity, window }
    }

    fn window_ms(&self) -> u64 {
        u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX)
    }
}

fn parse_setting<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring invalid rate limit setting");
            None
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch milliseconds at which the current window ends.
    pub reset_time_ms: u64,
    /// Set only on denial; always at least one second.
    pub retry_after_secs: Option<u64>,
}

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        u64::try_from(nanos / 1_000_000).unwrap_or(0)
    }
}

/// Clock advanced by hand, for tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[async_trait]
pub trait RateLimiterStore: Send + Sync {
    async fn check(&self, key: &str) -> Result<RateDecision>;

    /// Drops state for windows that have ended. Returns how many keys were removed.
    async fn sweep(&self) -> Result<usize> {
        Ok(0)
    }
}

#[derive(Debug, Clone, Copy)]
struct RateBucket {
    tokens: u32,
    window_start_ms: u64,
}

#[derive(Clone)]
pub struct FixedWindowLimiter {
    limits: RateLimits,
    clock: Arc<dyn Clock>,
    buckets: Arc<Mutex<HashMap<String, RateBucket>>>,
}

impl FixedWindowLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self::with_clock(limits, Arc::new(SystemClock))
    }

    pub fn with_clock(limits: RateLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            limits,
            clock,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    pub async fn tracked_keys(&self) -> usize {
        self.buckets.lock().await.len()
    }

    pub async fn sweep_at(&self, now_ms: u64) -> usize {
        let window_ms = self.limits.window_ms();
        let mut guard = self.buckets.lock().await;
        let before = guard.len();
        guard.retain(|_, bucket| now_ms.saturating_sub(bucket.window_start_ms) <= window_ms);
        let removed = before - guard.len();
        record_gauge(
            "rate_limiter_tracked_keys",
            guard.len() as f64,
            &TelemetryLabels::default(),
        );
        removed
    }

    fn decide(&self, bucket: &mut RateBucket, now_ms: u64) -> RateDecision {
        let window_ms = self.limits.window_ms();
        if now_ms.saturating_sub(bucket.window_start_ms) > window_ms {
            *bucket = RateBucket {
                tokens: self.limits.capacity,
                window_start_ms: now_ms,
            };
        }
        let reset_time_ms = bucket.window_start_ms.saturating_add(window_ms);

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            return RateDecision {
                allowed: true,
                limit: self.limits.capacity,
                remaining: bucket.tokens,
                reset_time_ms,
                retry_after_secs: None,
            };
        }

        let wait_ms = reset_time_ms.saturating_sub(now_ms);
        RateDecision {
            allowed: false,
            limit: self.limits.capacity,
            remaining: 0,
            reset_time_ms,
            retry_after_secs: Some(wait_ms.div_ceil(1000).max(1)),
        }
    }
}

#[async_trait]
impl RateLimiterStore for FixedWindowLimiter {
    async fn check(&self, key: &str) -> Result<RateDecision> {
        let decision = {
            let mut guard = self.buckets.lock().await;
            let now_ms = self.clock.now_ms();
            let bucket = guard.entry(key.to_string()).or_insert(RateBucket {
                tokens: self.limits.capacity,
                window_start_ms: now_ms,
            });
            self.decide(bucket, now_ms)
        };

        let outcome = if decision.allowed { "allowed" } else { "denied" };
        record_counter(
            "rate_limit_decisions_total",
            1,
            &TelemetryLabels::default().with_outcome(outcome),
        );
        if !decision.allowed {
            debug!(key, retry_after = ?decision.retry_after_secs, "rate limit exceeded");
        }
        Ok(decision)
    }

    async fn sweep(&self) -> Result<usize> {
        Ok(self.sweep_at(self.clock.now_ms()).await)
    }
}

/// Runs [`RateLimiterStore::sweep`] every `interval` until the task is aborted.
pub fn spawn_sweeper(store: Arc<dyn RateLimiterStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.sweep().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "swept expired rate limit buckets"),
                Err(err) => warn!(error = %err, "rate limit sweep failed"),
            }
        }
    })
}
