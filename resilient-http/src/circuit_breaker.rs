//! Circuit breaker for protecting a failing backend.
//!
//! Three states:
//! - Closed: normal operation, failures are counted in a trailing window
//! - Open: calls fail fast until the reset timeout has passed since the last failure
//! - Half-Open: trial calls are allowed; enough successes close the circuit,
//!   any failure re-opens it
//!
//! The Open → Half-Open transition is evaluated lazily whenever the state is
//! read; there is no background timer. The remaining open time reported in
//! [`ClientError::CircuitOpen`] is therefore accurate as of that read.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{ClientError, ClientResult};

/// Decides whether an error counts as a breaker failure.
pub type FailurePredicate = Arc<dyn Fn(&ClientError) -> bool + Send + Sync>;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests are allowed
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, trial requests are allowed to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        })
    }
}

/// Circuit breaker configuration.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Name for logging and errors
    pub name: String,
    /// Failures inside the window that open the circuit
    pub failure_threshold: u32,
    /// Time since the last failure before a trial is allowed
    pub reset_timeout: Duration,
    /// Trailing window in which failures are counted
    pub failure_window: Duration,
    /// Successes in half-open state needed to close the circuit
    pub success_threshold: u32,
    /// Which errors count as failures
    pub is_failure: FailurePredicate,
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("name", &self.name)
            .field("failure_threshold", &self.failure_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field("failure_window", &self.failure_window)
            .field("success_threshold", &self.success_threshold)
            .finish_non_exhaustive()
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            failure_window: Duration::from_secs(60),
            success_threshold: 1,
            is_failure: Arc::new(ClientError::is_circuit_failure),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a config with the given name and defaults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create a new config with custom failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Create a new config with custom success threshold.
    #[must_use]
    pub const fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Create a new config with custom reset timeout.
    #[must_use]
    pub const fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Create a new config with custom failure window.
    #[must_use]
    pub const fn with_failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }

    /// Replace the failure predicate.
    #[must_use]
    pub fn with_failure_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ClientError) -> bool + Send + Sync + 'static,
    {
        self.is_failure = Arc::new(predicate);
        self
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitStats {
    /// Current state
    pub state: CircuitState,
    /// Failures inside the window
    pub failures: u32,
    /// Successes in the current half-open trial
    pub successes: u32,
    /// Time until a trial is allowed; zero unless open
    pub remaining_open: Duration,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: VecDeque<Instant>,
    successes: u32,
    last_failure: Option<Instant>,
}

impl BreakerState {
    const fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            successes: 0,
            last_failure: None,
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.failures.front() {
            if now.saturating_duration_since(oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn remaining_open(&self, now: Instant, reset_timeout: Duration) -> Duration {
        match (self.state, self.last_failure) {
            (CircuitState::Open, Some(last)) => {
                reset_timeout.saturating_sub(now.saturating_duration_since(last))
            }
            _ => Duration::ZERO,
        }
    }

    fn failure_count(&self) -> u32 {
        u32::try_from(self.failures.len()).unwrap_or(u32::MAX)
    }
}

/// Circuit breaker shared by every call to one backend.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.inner.lock().state)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    /// Create a circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current state, applying the lazy Open → Half-Open transition.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.evaluate(&mut inner, Instant::now());
        inner.state
    }

    /// `false` only while open.
    #[must_use]
    pub fn can_execute(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Fail fast with a typed error while open.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::CircuitOpen`] carrying the remaining open time.
    pub fn ensure_can_execute(&self) -> ClientResult<()> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.evaluate(&mut inner, now);
        if inner.state == CircuitState::Open {
            let remaining = inner.remaining_open(now, self.config.reset_timeout);
            return Err(ClientError::circuit_open(&self.config.name, remaining));
        }
        Ok(())
    }

    /// Whether an error counts as a failure for this breaker.
    #[must_use]
    pub fn is_failure(&self, error: &ClientError) -> bool {
        (self.config.is_failure)(error)
    }

    /// Record a successful request.
    ///
    /// In half-open state, enough successes close the circuit. In closed
    /// state the failure window is pruned.
    pub fn record_success(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.evaluate(&mut inner, now);
        match inner.state {
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failures.clear();
                    inner.successes = 0;
                    info!(circuit = %self.config.name, "Circuit closed after recovery");
                }
            }
            CircuitState::Closed => inner.prune(now, self.config.failure_window),
            CircuitState::Open => {}
        }
    }

    /// Record a failed request.
    ///
    /// Callers filter with [`is_failure`](Self::is_failure) first.
    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.evaluate(&mut inner, now);
        inner.failures.push_back(now);
        inner.prune(now, self.config.failure_window);
        inner.last_failure = Some(now);

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count() >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    warn!(
                        circuit = %self.config.name,
                        failures = inner.failure_count(),
                        "Circuit opened due to failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.successes = 0;
                warn!(circuit = %self.config.name, "Circuit re-opened from half-open");
            }
            CircuitState::Open => {}
        }
    }

    /// Failures currently inside the window.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count()
    }

    /// Successes in the current half-open trial.
    #[must_use]
    pub fn success_count(&self) -> u32 {
        self.inner.lock().successes
    }

    /// Time until a trial is allowed, as of now.
    #[must_use]
    pub fn remaining_open_time(&self) -> Duration {
        self.stats().remaining_open
    }

    /// Snapshot of the breaker.
    #[must_use]
    pub fn stats(&self) -> CircuitStats {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.evaluate(&mut inner, now);
        CircuitStats {
            state: inner.state,
            failures: inner.failure_count(),
            successes: inner.successes,
            remaining_open: inner.remaining_open(now, self.config.reset_timeout),
        }
    }

    /// Reset the circuit breaker to closed state.
    pub fn reset(&self) {
        *self.inner.lock() = BreakerState::new();
        info!(circuit = %self.config.name, "Circuit reset");
    }

    fn evaluate(&self, inner: &mut BreakerState, now: Instant) {
        if inner.state != CircuitState::Open {
            return;
        }
        if let Some(last) = inner.last_failure {
            if now.saturating_duration_since(last) >= self.config.reset_timeout {
                inner.state = CircuitState::HalfOpen;
                inner.successes = 0;
                info!(circuit = %self.config.name, "Circuit transitioning to half-open");
            }
        }
    }
}
