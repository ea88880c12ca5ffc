//! Client-side sliding-window rate limiter.
//!
//! Admission is bounded to `max_requests` per trailing `window`, using a log
//! of admission timestamps shared by every call through one limiter.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ConfigError;
use crate::error::{ClientError, ClientResult};

/// Rate limit decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Request admitted and recorded
    Allowed,
    /// Window is full; a slot frees up after `retry_after`
    Denied {
        /// Time until the oldest timestamp leaves the window
        retry_after: Duration,
    },
}

/// Rate limit configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Requests admitted per window
    pub max_requests: u32,
    /// Trailing window duration
    pub window: Duration,
    /// Wait for a free slot instead of rejecting
    pub wait_for_slot: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            wait_for_slot: true,
        }
    }
}

impl RateLimiterConfig {
    /// Create a config admitting `max_requests` per `window`.
    #[must_use]
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            wait_for_slot: true,
        }
    }

    /// Check that at least one request can ever be admitted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRateLimit`] for a zero limit or window.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests == 0 {
            return Err(ConfigError::InvalidRateLimit("max_requests must be greater than 0".to_string()));
        }
        if self.window.is_zero() {
            return Err(ConfigError::InvalidRateLimit("window must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// Choose between waiting and rejecting when the window is full.
    #[must_use]
    pub const fn with_wait_for_slot(mut self, wait: bool) -> Self {
        self.wait_for_slot = wait;
        self
    }
}

/// Sliding-log rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter with the given configuration.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// The limiter configuration.
    #[must_use]
    pub const fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Admit now if a slot is free, without waiting.
    pub fn check(&self) -> RateLimitDecision {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps, now);

        if timestamps.len() < self.config.max_requests as usize {
            timestamps.push_back(now);
            return RateLimitDecision::Allowed;
        }

        let retry_after = timestamps.front().map_or(self.config.window, |&oldest| {
            self.config
                .window
                .saturating_sub(now.saturating_duration_since(oldest))
        });
        RateLimitDecision::Denied { retry_after }
    }

    /// Admit without waiting, or fail with a rate limit error.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::RateLimited`] with the computed wait.
    pub fn try_acquire(&self) -> ClientResult<()> {
        match self.check() {
            RateLimitDecision::Allowed => Ok(()),
            RateLimitDecision::Denied { retry_after } => Err(ClientError::rate_limited(
                format!(
                    "client limit of {} requests per {:?} reached",
                    self.config.max_requests, self.config.window
                ),
                Some(retry_after),
            )),
        }
    }

    /// Admit according to the configured policy.
    ///
    /// Waiting is a timed suspension that re-checks the window afterwards,
    /// since another call may have taken the freed slot.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::RateLimited`] when the window is full and
    /// `wait_for_slot` is off.
    pub async fn acquire(&self) -> ClientResult<()> {
        loop {
            match self.check() {
                RateLimitDecision::Allowed => return Ok(()),
                // a zero limit never frees a slot
                RateLimitDecision::Denied { retry_after } if self.config.wait_for_slot && self.config.max_requests > 0 => {
                    debug!(wait_ms = retry_after.as_millis(), "Rate limiter waiting for slot");
                    tokio::time::sleep(retry_after.max(Duration::from_millis(1))).await;
                }
                RateLimitDecision::Denied { .. } => return self.try_acquire(),
            }
        }
    }

    /// Free slots in the current window.
    #[must_use]
    pub fn available(&self) -> u32 {
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps, Instant::now());
        let used = u32::try_from(timestamps.len()).unwrap_or(u32::MAX);
        self.config.max_requests.saturating_sub(used)
    }

    fn prune(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = timestamps.front() {
            if now.saturating_duration_since(oldest) >= self.config.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}
