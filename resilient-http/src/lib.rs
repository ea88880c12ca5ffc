//! Resilient HTTP client core for typed REST SDKs.
//!
//! This crate provides:
//! - A middleware pipeline with explicit `handle(ctx, next)` units
//! - An HTTP execution engine with timeout, cancellation and typed errors
//! - Retry with exponential backoff honoring `Retry-After`
//! - A sliding-window client-side rate limiter
//! - A three-state circuit breaker
//! - Credential providers, including OAuth2 with single-flight refresh
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use resilient_http::{
//!     CircuitBreaker, CircuitBreakerConfig, ClientConfig, CredentialProvider, RequestOptions,
//!     RestClient, RetryConfig,
//! };
//!
//! # async fn run() -> resilient_http::ClientResult<()> {
//! let client = RestClient::new(
//!     ClientConfig::new("https://api.example.com/v1")
//!         .with_credentials(CredentialProvider::bearer("token"))
//!         .with_retry(RetryConfig::default().with_max_retries(2))
//!         .with_circuit_breaker(Arc::new(CircuitBreaker::new(
//!             CircuitBreakerConfig::new("issues").with_reset_timeout(Duration::from_secs(10)),
//!         ))),
//! )?;
//!
//! let issues: serde_json::Value = client
//!     .get_json("/issues", RequestOptions::new().query("state", "open"))
//!     .await?;
//! # let _ = issues;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod backoff;
pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod middleware;
pub mod rate_limiter;
pub mod request;
pub mod response;
pub mod retry_after;
pub mod transport;

pub use auth::{
    Capabilities, CredentialProvider, HttpTokenRefresher, OAuth2Config, OAuth2Credentials,
    TokenPersistence, TokenRefresher, TokenResponse, TokenSet,
};
pub use backoff::Backoff;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStats};
pub use client::RestClient;
pub use config::{ClientConfig, ConfigError};
pub use context::MiddlewareContext;
pub use error::{ClientError, ClientResult, ErrorCode, TransportError};
pub use execution::HttpExecutor;
pub use middleware::{
    CircuitBreakerMiddleware, LoggingMiddleware, Middleware, Next, Pipeline, RateLimitMiddleware,
    RequestIdMiddleware, RetryConfig, RetryMiddleware, RetryPredicate, Terminal, UserAgentMiddleware,
    compose,
};
pub use rate_limiter::{RateLimitDecision, RateLimiter, RateLimiterConfig};
pub use request::{Body, MultipartForm, QueryValue, Request, RequestOptions};
pub use response::{Response, ResponseBody};
pub use retry_after::parse_retry_after;
pub use transport::{
    ReqwestTransport, Transport, TransportBody, TransportConfig, TransportRequest, TransportResponse,
};
