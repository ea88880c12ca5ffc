//! Retry middleware with exponential backoff.
//!
//! Attempts are zero-indexed and written to the context before each call.
//! A rate-limit error carrying a retry-after hint is retried after exactly
//! that delay; every other retry uses [`Backoff`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{Middleware, Next};
use crate::backoff::Backoff;
use crate::context::MiddlewareContext;
use crate::error::{ClientError, ClientResult};
use crate::response::Response;

/// Decides whether an error on the given attempt should be retried.
pub type RetryPredicate = Arc<dyn Fn(&ClientError, u32) -> bool + Send + Sync>;

/// Retry configuration.
#[derive(Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 3)
    pub max_retries: u32,
    /// Delay calculation
    pub backoff: Backoff,
    /// Custom predicate; overrides [`ClientError::is_retryable`]
    pub predicate: Option<RetryPredicate>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
            predicate: None,
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

impl RetryConfig {
    /// Create a new retry config with custom max retries.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Create a new retry config with custom base delay.
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.backoff.base_delay = delay;
        self
    }

    /// Create a new retry config with custom max delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.backoff.max_delay = delay;
        self
    }

    /// Create a new retry config with custom multiplier.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff.multiplier = multiplier;
        self
    }

    /// Disable jitter.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.backoff.jitter = false;
        self
    }

    /// Replace the default retry decision.
    #[must_use]
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ClientError, u32) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Whether `error` on `attempt` should be retried, ignoring the budget.
    #[must_use]
    pub fn should_retry(&self, error: &ClientError, attempt: u32) -> bool {
        self.predicate
            .as_ref()
            .map_or_else(|| error.is_retryable(), |predicate| predicate(error, attempt))
    }

    /// Delay before the retry following `attempt`.
    #[must_use]
    pub fn delay_for(&self, error: &ClientError, attempt: u32) -> Duration {
        match error {
            ClientError::RateLimited {
                retry_after: Some(hint),
                ..
            } => *hint,
            _ => self.backoff.delay_for_attempt(attempt),
        }
    }
}

/// Re-runs the rest of the chain on retryable failures.
#[derive(Debug, Clone, Default)]
pub struct RetryMiddleware {
    config: RetryConfig,
}

impl RetryMiddleware {
    /// Create a retry middleware.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn handle(&self, ctx: &mut MiddlewareContext, next: Next<'_>) -> ClientResult<Response> {
        let mut attempt = 0;
        loop {
            ctx.attempt = attempt;
            let err = match next.run(ctx).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if attempt >= self.config.max_retries || !self.config.should_retry(&err, attempt) {
                return Err(err);
            }

            let delay = self.config.delay_for(&err, attempt);
            warn!(
                parent: &ctx.span,
                attempt = attempt + 1,
                max_retries = self.config.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Retrying request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
