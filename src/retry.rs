//! Retry with exponential backoff, and caller-driven cancellation.

use crate::config::RetryConfig;
use crate::error::CancelReason;
use crate::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Decides whether a failed attempt is worth repeating.
pub type RetryPredicate = fn(&Error) -> bool;

/// Cancellation token and deadline that bound a single call, including all
/// of its retries.
///
/// Both are observed while a request is in flight and while waiting out a
/// backoff delay. Tripping either fails the call with [`Error::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancellation: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run `future` unless the context trips first.
    pub(crate) async fn guard<F: Future>(&self, future: F) -> Result<F::Output> {
        let cancelled = async {
            match &self.cancellation {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(Error::Cancelled { reason: CancelReason::Cancelled }),
            _ = deadline => Err(Error::Cancelled { reason: CancelReason::DeadlineExceeded }),
            output = future => Ok(output),
        }
    }
}

/// Bounded exponential backoff around a fallible async operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    predicate: RetryPredicate,
}

impl RetryPolicy {
    /// Policy retrying the errors for which [`Error::is_retryable`] holds.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            predicate: Error::is_retryable,
        }
    }

    /// Replace the retryability predicate.
    pub fn with_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Upper bound on attempts made by [`RetryPolicy::run`].
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.saturating_add(1)
    }

    /// Whether `error` would be retried by this policy.
    pub fn should_retry(&self, error: &Error) -> bool {
        (self.predicate)(error)
    }

    /// Delay before retry `retry` (1-based), without jitter:
    /// `min(base_delay * multiplier^(retry-1), max_delay)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.config.base_delay.as_secs_f64() * self.config.multiplier.powi(exponent);
        self.cap(secs)
    }

    fn backoff(&self, retry: u32, error: &Error) -> Duration {
        let mut secs = self.delay_for(retry).as_secs_f64();
        if self.config.jitter > 0.0 {
            let spread = rand::rng().random_range(-self.config.jitter..=self.config.jitter);
            secs *= 1.0 + spread;
        }
        if let Some(hint) = error.retry_after() {
            secs = secs.max(hint.as_secs_f64());
        }
        self.cap(secs)
    }

    fn cap(&self, secs: f64) -> Duration {
        let max = self.config.max_delay;
        if !secs.is_finite() || secs >= max.as_secs_f64() {
            return max;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// the retry budget is spent, in which case the last error is returned.
    pub async fn run<T, F, Fut>(&self, ctx: &RequestContext, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            let err = match ctx.guard(operation()).await? {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if retry >= self.config.max_retries || !self.should_retry(&err) {
                return Err(err);
            }

            retry += 1;
            let delay = self.backoff(retry, &err);
            warn!(
                attempt = retry,
                max_attempts = self.max_attempts(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                code = err.code(),
                "request failed, retrying"
            );
            ctx.guard(tokio::time::sleep(delay)).await?;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
