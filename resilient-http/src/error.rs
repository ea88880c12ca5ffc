//! Typed error hierarchy for every outcome the client can surface.
//!
//! Callers always receive a [`ClientError`], never a raw transport failure,
//! so they can branch on [`ClientError::code`] without string matching.
//! Each variant is classified for retry and for circuit-breaker accounting.

use serde_json::Value;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Shared, cloneable wrapped cause.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type ClientResult<T> = Result<T, ClientError>;

/// Failure reported by a [`Transport`](crate::transport::Transport)
/// before any HTTP response was received.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<SharedError>,
}

impl TransportError {
    /// Create a transport error with a message only.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error wrapping an underlying cause.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// The human readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Every error the client can return.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// Transport-level failure (connection refused/reset, DNS failure)
    #[error("Network error: {message}")]
    Network {
        /// Description of the failure
        message: String,
        /// Underlying cause
        #[source]
        source: Option<SharedError>,
    },

    /// The internal timer elapsed before a response arrived
    #[error("Request timed out after {duration:?}")]
    Timeout {
        /// The effective timeout that elapsed
        duration: Duration,
    },

    /// The caller cancelled the request
    #[error("Request aborted by caller")]
    Aborted,

    /// HTTP 401
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Message extracted from the response
        message: String,
        /// Parsed error body
        details: Option<Value>,
    },

    /// HTTP 403
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Message extracted from the response
        message: String,
        /// Parsed error body
        details: Option<Value>,
    },

    /// HTTP 404
    #[error("Not found: {message}")]
    NotFound {
        /// Message extracted from the response
        message: String,
        /// Parsed error body
        details: Option<Value>,
    },

    /// HTTP 429, or a local rate limiter rejection
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Message extracted from the response
        message: String,
        /// How long to wait before retrying, when known
        retry_after: Option<Duration>,
        /// Response status, absent for local limiter rejections
        status: Option<u16>,
        /// Parsed error body
        details: Option<Value>,
    },

    /// HTTP 5xx
    #[error("Server error ({status}): {message}")]
    ServerError {
        /// Response status code
        status: u16,
        /// Message extracted from the response
        message: String,
        /// Parsed error body
        details: Option<Value>,
    },

    /// Any other non-2xx response
    #[error("API error ({status}): {message}")]
    Api {
        /// Response status code
        status: u16,
        /// Message extracted from the response
        message: String,
        /// Parsed error body
        details: Option<Value>,
    },

    /// Malformed outbound input or unparseable inbound payload
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the problem
        message: String,
        /// Underlying cause
        #[source]
        source: Option<SharedError>,
    },

    /// The circuit breaker rejected the call before dispatch
    #[error("Circuit breaker open for {name}, retry in {retry_after:?}")]
    CircuitOpen {
        /// Breaker name
        name: String,
        /// Remaining time until a trial request is allowed
        retry_after: Duration,
    },

    /// No usable access token is available
    #[error("Access token expired")]
    TokenExpired,

    /// Token refresh failed (bad server response or transport failure)
    #[error("Token refresh failed: {message}")]
    TokenRefresh {
        /// Description of the failure
        message: String,
        /// Token endpoint status, if a response was received
        status: Option<u16>,
        /// Underlying cause
        #[source]
        source: Option<SharedError>,
    },

    /// Token refresh cannot be attempted with the current configuration
    #[error("Token refresh not possible: {message}")]
    TokenRefreshConfig {
        /// Description of the missing configuration
        message: String,
    },

    /// Invalid client configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Transport failure
    Network,
    /// Internal timeout
    Timeout,
    /// Caller cancellation
    Aborted,
    /// HTTP 401
    Unauthorized,
    /// HTTP 403
    Forbidden,
    /// HTTP 404
    NotFound,
    /// HTTP 429 or local limiter
    RateLimited,
    /// HTTP 5xx
    ServerError,
    /// Other non-2xx
    Api,
    /// Bad input or payload
    Validation,
    /// Breaker open
    CircuitOpen,
    /// Expired token
    TokenExpired,
    /// Refresh failure
    TokenRefresh,
    /// Refresh misconfiguration
    TokenRefreshConfig,
    /// Client misconfiguration
    Config,
}

impl ErrorCode {
    /// Get the string representation of the error code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Aborted => "ABORTED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::RateLimited => "RATE_LIMITED",
            Self::ServerError => "SERVER_ERROR",
            Self::Api => "API_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenRefresh => "TOKEN_REFRESH_FAILED",
            Self::TokenRefreshConfig => "TOKEN_REFRESH_CONFIG",
            Self::Config => "CONFIG_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ClientError {
    /// Get the error code for this error
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Network { .. } => ErrorCode::Network,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Aborted => ErrorCode::Aborted,
            Self::Unauthorized { .. } => ErrorCode::Unauthorized,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::ServerError { .. } => ErrorCode::ServerError,
            Self::Api { .. } => ErrorCode::Api,
            Self::Validation { .. } => ErrorCode::Validation,
            Self::CircuitOpen { .. } => ErrorCode::CircuitOpen,
            Self::TokenExpired => ErrorCode::TokenExpired,
            Self::TokenRefresh { .. } => ErrorCode::TokenRefresh,
            Self::TokenRefreshConfig { .. } => ErrorCode::TokenRefreshConfig,
            Self::Config(_) => ErrorCode::Config,
        }
    }

    /// HTTP status associated with this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Forbidden { .. } => Some(403),
            Self::NotFound { .. } => Some(404),
            Self::ServerError { status, .. } | Self::Api { status, .. } => Some(*status),
            Self::RateLimited { status, .. } | Self::TokenRefresh { status, .. } => *status,
            _ => None,
        }
    }

    /// Parsed error body returned by the server, if any.
    #[must_use]
    pub const fn details(&self) -> Option<&Value> {
        match self {
            Self::Unauthorized { details, .. }
            | Self::Forbidden { details, .. }
            | Self::NotFound { details, .. }
            | Self::RateLimited { details, .. }
            | Self::ServerError { details, .. }
            | Self::Api { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Suggested wait before retrying, if the error carries one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            Self::CircuitOpen { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Check if this error is retryable by default.
    ///
    /// Network failures, timeouts, 5xx responses and rate limiting are
    /// transient; every other kind is the caller's problem or a deliberate
    /// rejection.
    ///
    /// # Examples
    ///
    /// ```
    /// use resilient_http::ClientError;
    ///
    /// assert!(ClientError::network("connection reset").is_retryable());
    /// assert!(!ClientError::Aborted.is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Timeout { .. }
                | Self::RateLimited { .. }
                | Self::ServerError { .. }
        )
    }

    /// Check if this error counts against a circuit breaker by default.
    ///
    /// Timeouts count as network-class failures. A local limiter rejection
    /// carries no status and does not count.
    #[must_use]
    pub const fn is_circuit_failure(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Timeout { .. }
                | Self::RateLimited { status: Some(_), .. }
                | Self::ServerError { .. }
        )
    }

    /// Create a network error with the given message.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a validation error with the given message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            source: None,
        }
    }

    /// Create a validation error wrapping an underlying cause.
    #[must_use]
    pub fn validation_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Create a rate limited error carrying a retry hint.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
            status: None,
            details: None,
        }
    }

    /// Create a circuit open error for the given breaker.
    #[must_use]
    pub fn circuit_open(name: impl Into<String>, retry_after: Duration) -> Self {
        Self::CircuitOpen {
            name: name.into(),
            retry_after,
        }
    }

    /// Create a token refresh failure.
    #[must_use]
    pub fn token_refresh(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::TokenRefresh {
            message: message.into(),
            status,
            source: None,
        }
    }

    /// Create a token refresh configuration error.
    #[must_use]
    pub fn token_refresh_config(message: impl Into<String>) -> Self {
        Self::TokenRefreshConfig {
            message: message.into(),
        }
    }

    /// Classify a non-2xx HTTP response into the error taxonomy.
    #[must_use]
    pub fn from_status(
        status: u16,
        message: impl Into<String>,
        details: Option<Value>,
        retry_after: Option<Duration>,
    ) -> Self {
        let message = message.into();
        match status {
            401 => Self::Unauthorized { message, details },
            403 => Self::Forbidden { message, details },
            404 => Self::NotFound { message, details },
            429 => Self::RateLimited {
                message,
                retry_after,
                status: Some(status),
                details,
            },
            500..=599 => Self::ServerError {
                status,
                message,
                details,
            },
            _ => Self::Api {
                status,
                message,
                details,
            },
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        Self::Network {
            message: err.message.clone(),
            source: Some(Arc::new(err)),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation_with_source(format!("JSON error: {err}"), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(ClientError::network("reset").is_retryable());
        assert!(ClientError::Timeout { duration: Duration::from_secs(1) }.is_retryable());
        assert!(ClientError::rate_limited("slow down", None).is_retryable());
        assert!(ClientError::from_status(503, "unavailable", None, None).is_retryable());
    }

    #[test]
    fn test_non_retryable_errors() {
        assert!(!ClientError::Aborted.is_retryable());
        assert!(!ClientError::from_status(400, "bad", None, None).is_retryable());
        assert!(!ClientError::from_status(401, "who", None, None).is_retryable());
        assert!(!ClientError::from_status(404, "gone", None, None).is_retryable());
        assert!(!ClientError::validation("bad input").is_retryable());
        assert!(!ClientError::circuit_open("api", Duration::from_secs(1)).is_retryable());
        assert!(!ClientError::token_refresh_config("no refresh token").is_retryable());
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(ClientError::from_status(401, "", None, None).code(), ErrorCode::Unauthorized);
        assert_eq!(ClientError::from_status(403, "", None, None).code(), ErrorCode::Forbidden);
        assert_eq!(ClientError::from_status(404, "", None, None).code(), ErrorCode::NotFound);
        assert_eq!(ClientError::from_status(429, "", None, None).code(), ErrorCode::RateLimited);
        assert_eq!(ClientError::from_status(502, "", None, None).code(), ErrorCode::ServerError);
        assert_eq!(ClientError::from_status(422, "", None, None).code(), ErrorCode::Api);
        assert_eq!(ClientError::from_status(422, "", None, None).status(), Some(422));
        assert_eq!(ClientError::from_status(429, "", None, None).status(), Some(429));
    }

    #[test]
    fn test_local_rate_limit_has_no_status() {
        let err = ClientError::rate_limited("local", Some(Duration::from_millis(5)));
        assert_eq!(err.status(), None);
        assert_eq!(err.retry_after(), Some(Duration::from_millis(5)));
        assert!(err.is_retryable());
        assert!(!err.is_circuit_failure());
        assert!(ClientError::from_status(429, "", None, None).is_circuit_failure());
    }

    #[test]
    fn test_details_attached() {
        let body = serde_json::json!({"message": "nope"});
        let err = ClientError::from_status(400, "nope", Some(body.clone()), None);
        assert_eq!(err.details(), Some(&body));
    }

    #[test]
    fn test_circuit_failure_classification() {
        assert!(ClientError::Timeout { duration: Duration::from_secs(1) }.is_circuit_failure());
        assert!(ClientError::from_status(500, "", None, None).is_circuit_failure());
        assert!(!ClientError::from_status(400, "", None, None).is_circuit_failure());
        assert!(!ClientError::Aborted.is_circuit_failure());
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::circuit_open("issues", Duration::from_secs(2));
        assert_eq!(err.to_string(), "Circuit breaker open for issues, retry in 2s");
        assert_eq!(ErrorCode::RateLimited.as_str(), "RATE_LIMITED");
    }

    #[test]
    fn test_transport_error_becomes_network() {
        let err: ClientError = TransportError::new("connection refused").into();
        assert_eq!(err.code(), ErrorCode::Network);
        assert!(std::error::Error::source(&err).is_some());
    }
}
