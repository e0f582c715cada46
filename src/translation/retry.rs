use crate::translation::engine::{EngineError, EngineOutcome, TranslationEngine};
use crate::translation::rate_limiter::RateLimiter;
use crate::utils::config::RetryConfig;
use crate::utils::{BatchTranslatorError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64,
    /// Whether an empty engine result is retried before degrading.
    pub retry_empty: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            jitter_factor: config.jitter_factor,
            retry_empty: config.retry_empty,
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let mut factor = self.multiplier.max(1.0).powi(exponent);
        if self.jitter_factor > 0.0 {
            factor *= 1.0 + fastrand::f64() * self.jitter_factor;
        }
        // Capped in float seconds; the uncapped product may not fit a Duration.
        let secs = (self.initial_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Empty,
}

/// How the caller classified one attempt.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    Retryable { kind: FailureKind, reason: String },
    Fatal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryFailure {
    Exhausted {
        kind: FailureKind,
        attempts: u32,
        last_error: String,
    },
    Fatal(String),
}

/// Runs `op` until it succeeds, fails fatally, or the policy runs out of attempts.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> std::result::Result<T, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AttemptOutcome<T>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            AttemptOutcome::Success(value) => return Ok(value),
            AttemptOutcome::Fatal(reason) => return Err(RetryFailure::Fatal(reason)),
            AttemptOutcome::Retryable { kind, reason } => {
                let give_up = attempt >= policy.max_attempts
                    || (kind == FailureKind::Empty && !policy.retry_empty);
                if give_up {
                    return Err(RetryFailure::Exhausted {
                        kind,
                        attempts: attempt,
                        last_error: reason,
                    });
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    kind = ?kind,
                    reason = %reason,
                    "Engine call failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
    Translated(String),
    /// Every attempt came back empty; the caller substitutes the sentinel.
    Degraded { attempts: u32 },
}

pub fn classify(outcome: EngineOutcome) -> AttemptOutcome<String> {
    match outcome {
        EngineOutcome::Translated(text) if !text.trim().is_empty() => AttemptOutcome::Success(text),
        EngineOutcome::Translated(_) | EngineOutcome::Empty => AttemptOutcome::Retryable {
            kind: FailureKind::Empty,
            reason: "engine produced no result".to_string(),
        },
        EngineOutcome::Failed(EngineError::Transient(reason)) => AttemptOutcome::Retryable {
            kind: FailureKind::Transient,
            reason,
        },
        EngineOutcome::Failed(EngineError::Fatal(reason)) => AttemptOutcome::Fatal(reason),
    }
}

/// One rate-limited, time-bounded, retried engine call.
#[derive(Clone)]
pub struct RetryingInvoker {
    engine: Arc<dyn TranslationEngine>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl RetryingInvoker {
    pub fn new(
        engine: Arc<dyn TranslationEngine>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            limiter,
            policy,
            call_timeout,
        }
    }

    pub async fn invoke(&self, text: &str) -> Result<InvokeOutcome> {
        let result = retry_with_policy(&self.policy, |attempt| async move {
            self.limiter.acquire().await;
            debug!(attempt = attempt, chars = text.chars().count(), "Submitting text");
            match tokio::time::timeout(self.call_timeout, self.engine.submit(text)).await {
                Ok(outcome) => classify(outcome),
                Err(_) => AttemptOutcome::Retryable {
                    kind: FailureKind::Transient,
                    reason: format!("engine call timed out after {:?}", self.call_timeout),
                },
            }
        })
        .await;

        match result {
            Ok(text) => Ok(InvokeOutcome::Translated(text)),
            Err(RetryFailure::Exhausted {
                kind: FailureKind::Empty,
                attempts,
                ..
            }) => Ok(InvokeOutcome::Degraded { attempts }),
            Err(RetryFailure::Exhausted {
                kind: FailureKind::Transient,
                attempts,
                last_error,
            }) => Err(BatchTranslatorError::RetryExhausted {
                attempts,
                last_error,
            }),
            Err(RetryFailure::Fatal(reason)) => Err(BatchTranslatorError::Fatal(reason)),
        }
    }
}
