//! Retry state machine with backoff and cooperative cancellation.
//!
//! One [`RetryController`] drives at most one attempt chain at a time. Every
//! suspension point (the attempt itself and the backoff sleep) races the
//! chain's [`CancellationToken`], so cancelling drops the in-flight attempt
//! and guarantees the operation is not invoked again.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use metrics::counter;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retryable,
    Fatal,
}

/// Tells the controller whether an error is worth another attempt.
pub trait Classify {
    fn disposition(&self) -> Disposition;

    fn is_retryable(&self) -> bool {
        self.disposition() == Disposition::Retryable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Attempting,
    Retrying,
    Success,
    Failed,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Success | Phase::Failed | Phase::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Zero-based index of the current (or last) attempt.
    pub attempt: u32,
    pub next_delay_ms: u64,
    pub phase: Phase,
}

impl Default for RetryState {
    fn default() -> Self {
        Self {
            attempt: 0,
            next_delay_ms: 0,
            phase: Phase::Idle,
        }
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success { value: T, attempts: u32 },
    Failed { error: E, attempts: u32, retryable: bool },
    /// Not an error: the caller (or a newer chain) asked to stop.
    Cancelled { attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. }
            | RetryOutcome::Failed { attempts, .. }
            | RetryOutcome::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryOutcome::Cancelled { .. })
    }
}

struct Chain {
    generation: u64,
    token: CancellationToken,
}

pub struct RetryController {
    policy: BackoffPolicy,
    max_retries: u32,
    chain: Mutex<Chain>,
    state: watch::Sender<RetryState>,
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new(BackoffPolicy::default(), DEFAULT_MAX_RETRIES)
    }
}

impl RetryController {
    pub fn new(policy: BackoffPolicy, max_retries: u32) -> Self {
        let (state, _) = watch::channel(RetryState::default());
        Self {
            policy,
            max_retries,
            chain: Mutex::new(Chain {
                generation: 0,
                token: CancellationToken::new(),
            }),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RetryState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RetryState {
        *self.state.borrow()
    }

    /// Cancels the running chain, if any. Safe to call repeatedly.
    pub fn cancel(&self) {
        let chain = self.chain.lock().unwrap_or_else(PoisonError::into_inner);
        chain.token.cancel();
    }

    /// Runs `operation` until it succeeds, fails with a fatal error, exhausts
    /// `max_retries` retries, or is cancelled. Starting a chain cancels the
    /// previous one.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        self.execute_until(&CancellationToken::new(), operation).await
    }

    /// Like [`execute`](Self::execute), but the chain also stops once `stop`
    /// is cancelled, including when it was cancelled before the chain began.
    pub async fn execute_until<T, E, F, Fut>(
        &self,
        stop: &CancellationToken,
        mut operation: F,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let (generation, token) = self.begin(stop);
        let mut attempt = 0u32;

        loop {
            if token.is_cancelled() {
                return self.cancelled(generation, attempt, attempt);
            }
            self.publish(generation, attempt, 0, Phase::Attempting);
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return self.cancelled(generation, attempt, attempt + 1),
                result = operation(attempt) => result,
            };

            let error = match result {
                Ok(value) => {
                    self.publish(generation, attempt, 0, Phase::Success);
                    counter!("retry_chains_total", "outcome" => "success").increment(1);
                    debug!(attempts = attempt + 1, "operation succeeded");
                    return RetryOutcome::Success {
                        value,
                        attempts: attempt + 1,
                    };
                }
                Err(error) => error,
            };

            let retryable = error.is_retryable();
            if !retryable || attempt >= self.max_retries {
                self.publish(generation, attempt, 0, Phase::Failed);
                counter!("retry_chains_total", "outcome" => "failed").increment(1);
                warn!(attempts = attempt + 1, retryable, error = %error, "operation failed");
                return RetryOutcome::Failed {
                    error,
                    attempts: attempt + 1,
                    retryable,
                };
            }

            let delay = self.policy.delay(attempt);
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            self.publish(generation, attempt, delay_ms, Phase::Retrying);
            counter!("retry_attempts_total").increment(1);
            info!(
                attempt = attempt + 1,
                max_retries = self.max_retries,
                delay_ms,
                error = %error,
                "retrying after transient failure"
            );

            tokio::select! {
                biased;
                _ = token.cancelled() => return self.cancelled(generation, attempt, attempt + 1),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn begin(&self, stop: &CancellationToken) -> (u64, CancellationToken) {
        let mut chain = self.chain.lock().unwrap_or_else(PoisonError::into_inner);
        chain.token.cancel();
        chain.generation += 1;
        chain.token = stop.child_token();
        (chain.generation, chain.token.clone())
    }

    fn cancelled<T, E>(&self, generation: u64, attempt: u32, attempts: u32) -> RetryOutcome<T, E> {
        self.publish(generation, attempt, 0, Phase::Cancelled);
        counter!("retry_chains_total", "outcome" => "cancelled").increment(1);
        debug!(attempts, "retry chain cancelled");
        RetryOutcome::Cancelled { attempts }
    }

    /// Only the newest chain may publish, so a superseded chain cannot
    /// overwrite its successor's state.
    fn publish(&self, generation: u64, attempt: u32, next_delay_ms: u64, phase: Phase) {
        let chain = self.chain.lock().unwrap_or_else(PoisonError::into_inner);
        if chain.generation != generation {
            return;
        }
        self.state.send_replace(RetryState {
            attempt,
            next_delay_ms,
            phase,
        });
    }
}
