//! Client configuration with validation.
//!
//! A [`ClientConfig`] is built with `with_*` methods or loaded from the
//! environment, validated once, and then turned into a
//! [`RestClient`](crate::client::RestClient).

use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use crate::auth::CredentialProvider;
use crate::circuit_breaker::CircuitBreaker;
use crate::middleware::{Middleware, RetryConfig};
use crate::rate_limiter::RateLimiter;
use crate::transport::{Transport, TransportConfig};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default user agent sent by the user-agent middleware.
pub const DEFAULT_USER_AGENT: &str = concat!("resilient-http/", env!("CARGO_PKG_VERSION"));

const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "[::1]", "::1"];

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid URL format
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl {
        /// Which setting held the URL
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Plain HTTP to a non-loopback host without opting in
    #[error("Insecure base URL {url}: use https or enable allow_insecure_http")]
    InsecureUrl {
        /// The rejected URL
        url: String,
    },

    /// A default header name or value is not valid on the wire
    #[error("Invalid default header {name}")]
    InvalidHeader {
        /// Header name as configured
        name: String,
    },

    /// Invalid timeout value
    #[error("Invalid timeout: must be greater than 0")]
    InvalidTimeout,

    /// Rate limiter that can never admit a request
    #[error("Invalid rate limit: {0}")]
    InvalidRateLimit(String),

    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parser message
        reason: String,
    },
}

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL that relative request paths are joined to
    pub base_url: String,
    /// Client name recorded on every request span
    pub name: String,
    /// Credential provider used for request auth headers
    pub credentials: Option<CredentialProvider>,
    /// Default per-request timeout (default: 30s)
    pub timeout: Duration,
    /// Headers sent with every request, overridden by per-request headers
    pub default_headers: Vec<(String, String)>,
    /// User middleware, innermost in the chain, outermost first
    pub middleware: Vec<Arc<dyn Middleware>>,
    /// Transport override, mainly for tests
    pub transport: Option<Arc<dyn Transport>>,
    /// Settings for the default reqwest transport
    pub transport_config: TransportConfig,
    /// Permit plain HTTP to non-loopback hosts
    pub allow_insecure_http: bool,
    /// User agent header value
    pub user_agent: String,
    /// Retry policy; `None` disables retries
    pub retry: Option<RetryConfig>,
    /// Shared rate limiter; `None` disables client-side limiting
    pub rate_limiter: Option<Arc<RateLimiter>>,
    /// Shared circuit breaker; `None` disables circuit breaking
    pub circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("name", &self.name)
            .field("credentials", &self.credentials)
            .field("timeout", &self.timeout)
            .field("default_headers", &self.default_headers.len())
            .field("middleware", &self.middleware.len())
            .field("allow_insecure_http", &self.allow_insecure_http)
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .field("rate_limiter", &self.rate_limiter.is_some())
            .field("circuit_breaker", &self.circuit_breaker.is_some())
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    /// Create a configuration for the given base URL with defaults.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            name: "http-client".to_string(),
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
            default_headers: Vec::new(),
            middleware: Vec::new(),
            transport: None,
            transport_config: TransportConfig::default(),
            allow_insecure_http: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry: None,
            rate_limiter: None,
            circuit_breaker: None,
        }
    }

    /// Loads configuration from environment variables with validation.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is missing, unparseable, or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("HTTP_CLIENT_BASE_URL")
            .ok_or_else(|| ConfigError::MissingRequired("HTTP_CLIENT_BASE_URL".to_string()))?;

        let mut config = Self::new(base_url)
            .with_timeout(Duration::from_secs(parse_var(
                &lookup,
                "HTTP_CLIENT_TIMEOUT_SECS",
                DEFAULT_TIMEOUT.as_secs(),
            )?))
            .with_allow_insecure_http(parse_var(&lookup, "HTTP_CLIENT_ALLOW_INSECURE_HTTP", false)?);

        if let Some(user_agent) = lookup("HTTP_CLIENT_USER_AGENT") {
            config = config.with_user_agent(user_agent);
        }
        if let Some(name) = lookup("HTTP_CLIENT_NAME") {
            config = config.with_name(name);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the client name used in logs.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the credential provider.
    #[must_use]
    pub fn with_credentials(mut self, credentials: CredentialProvider) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the default request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a default header.
    #[must_use]
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Append a user middleware.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Replace the transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the settings for the default transport.
    #[must_use]
    pub fn with_transport_config(mut self, transport_config: TransportConfig) -> Self {
        self.transport_config = transport_config;
        self
    }

    /// Permit plain HTTP to any host.
    #[must_use]
    pub const fn with_allow_insecure_http(mut self, allow: bool) -> Self {
        self.allow_insecure_http = allow;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Enable retries.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Use a shared rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Use a shared circuit breaker.
    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Parse the base URL and enforce the HTTPS rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse, is not http(s), or is
    /// plain HTTP to a non-loopback host without `allow_insecure_http`.
    pub fn parsed_base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidUrl {
            field: "base_url".to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "https" => Ok(url),
            "http" => {
                let loopback = url
                    .host_str()
                    .is_some_and(|host| LOOPBACK_HOSTS.contains(&host));
                if loopback || self.allow_insecure_http {
                    Ok(url)
                } else {
                    Err(ConfigError::InsecureUrl {
                        url: self.base_url.clone(),
                    })
                }
            }
            other => Err(ConfigError::InvalidUrl {
                field: "base_url".to_string(),
                reason: format!("unsupported scheme {other}"),
            }),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_base_url()?;
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        if let Some(limiter) = &self.rate_limiter {
            limiter.config().validate()?;
        }
        for (name, value) in &self.default_headers {
            if HeaderName::from_str(name).is_err() || HeaderValue::from_str(value).is_err() {
                return Err(ConfigError::InvalidHeader { name: name.clone() });
            }
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::new("https://api.example.com");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.retry.is_none());
        assert!(config.user_agent.starts_with("resilient-http/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_https_required_for_remote_hosts() {
        let config = ClientConfig::new("http://api.example.com");
        assert!(matches!(config.validate(), Err(ConfigError::InsecureUrl { .. })));

        let config = ClientConfig::new("http://api.example.com").with_allow_insecure_http(true);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_allowed_for_loopback() {
        assert!(ClientConfig::new("http://localhost:8080").validate().is_ok());
        assert!(ClientConfig::new("http://127.0.0.1:9000/api").validate().is_ok());
        assert!(ClientConfig::new("http://[::1]:9000").validate().is_ok());
    }

    #[test]
    fn test_invalid_base_url() {
        let config = ClientConfig::new("not a url");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { .. })));

        let config = ClientConfig::new("ftp://files.example.com");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ClientConfig::new("https://api.example.com").with_timeout(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::InvalidTimeout));
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let limiter = Arc::new(RateLimiter::new(crate::RateLimiterConfig::new(0, Duration::from_secs(1))));
        let config = ClientConfig::new("https://api.example.com").with_rate_limiter(limiter);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRateLimit(_))));
    }

    #[test]
    fn test_invalid_default_header_rejected() {
        let config = ClientConfig::new("https://api.example.com").with_default_header("bad header", "x");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidHeader { .. })));
    }

    #[test]
    fn test_from_lookup() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("HTTP_CLIENT_BASE_URL", "https://api.example.com/v2"),
            ("HTTP_CLIENT_TIMEOUT_SECS", "5"),
            ("HTTP_CLIENT_USER_AGENT", "sdk/1.0"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://api.example.com/v2");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, "sdk/1.0");
    }

    #[test]
    fn test_from_lookup_missing_base_url() {
        let result = ClientConfig::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(ConfigError::MissingRequired(_))));
    }

    #[test]
    fn test_from_lookup_parse_error() {
        let result = ClientConfig::from_lookup(lookup_from(&[
            ("HTTP_CLIENT_BASE_URL", "https://api.example.com"),
            ("HTTP_CLIENT_TIMEOUT_SECS", "soon"),
        ]));
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }
}
