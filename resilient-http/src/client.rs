//! Client facade.
//!
//! [`RestClient`] validates a [`ClientConfig`], builds the middleware chain
//! once, and exposes verb-specific entry points. Every call gets its own
//! [`MiddlewareContext`] and `http_request` span.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Instrument, info_span};
use url::Url;

use crate::auth::CredentialProvider;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::ClientConfig;
use crate::context::MiddlewareContext;
use crate::error::ClientResult;
use crate::execution::HttpExecutor;
use crate::middleware::{
    CircuitBreakerMiddleware, LoggingMiddleware, Middleware, Pipeline, REQUEST_ID_HEADER, RateLimitMiddleware,
    RequestIdMiddleware, RetryMiddleware, UserAgentMiddleware,
};
use crate::rate_limiter::RateLimiter;
use crate::request::{Body, Request, RequestOptions};
use crate::response::Response;
use crate::transport::{ReqwestTransport, Transport};

fn default_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .rev()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// HTTP client with a pre-built resilience chain.
///
/// Chain order, outermost first: request id, user agent, circuit breaker,
/// rate limiter, retry, user middleware, logging, then the executor.
#[derive(Clone)]
pub struct RestClient {
    name: String,
    base_url: Url,
    credentials: Option<Arc<CredentialProvider>>,
    pipeline: Pipeline,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("name", &self.name)
            .field("base_url", &self.base_url.as_str())
            .field("middleware", &self.pipeline.names())
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Build a client from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`](crate::ClientError::Config) if the
    /// configuration is invalid, or a network error if the default transport
    /// cannot be built.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let base_url = config.parsed_base_url()?;

        let transport: Arc<dyn Transport> = match config.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&config.transport_config)?),
        };

        // a default header wins over the generated value
        let request_id = default_header(&config.default_headers, REQUEST_ID_HEADER)
            .map_or_else(RequestIdMiddleware::new, |id| RequestIdMiddleware::with_fixed_id(id));
        let user_agent = default_header(&config.default_headers, "user-agent")
            .map_or_else(|| config.user_agent.clone(), str::to_string);

        let mut chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(request_id),
            Arc::new(UserAgentMiddleware::new(user_agent)),
        ];
        if let Some(breaker) = &config.circuit_breaker {
            chain.push(Arc::new(CircuitBreakerMiddleware::new(Arc::clone(breaker))));
        }
        if let Some(limiter) = &config.rate_limiter {
            chain.push(Arc::new(RateLimitMiddleware::new(Arc::clone(limiter))));
        }
        if let Some(retry) = config.retry {
            chain.push(Arc::new(RetryMiddleware::new(retry)));
        }
        chain.extend(config.middleware);
        chain.push(Arc::new(LoggingMiddleware::new()));

        let executor = HttpExecutor::new(
            base_url.clone(),
            config.default_headers,
            config.timeout,
            transport,
        );

        Ok(Self {
            name: config.name,
            base_url,
            credentials: config.credentials.map(Arc::new),
            pipeline: Pipeline::new(chain, Arc::new(executor)),
            circuit_breaker: config.circuit_breaker,
            rate_limiter: config.rate_limiter,
        })
    }

    /// Build a client from `HTTP_CLIENT_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the environment is incomplete or invalid.
    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Client name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validated base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Installed middleware, outermost first.
    #[must_use]
    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.pipeline.names()
    }

    /// Credential provider, if configured.
    #[must_use]
    pub fn credentials(&self) -> Option<&CredentialProvider> {
        self.credentials.as_deref()
    }

    /// Shared circuit breaker, if configured.
    #[must_use]
    pub const fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    /// Shared rate limiter, if configured.
    #[must_use]
    pub const fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.rate_limiter.as_ref()
    }

    /// Execute a request through the full chain.
    ///
    /// # Errors
    ///
    /// Returns the typed error produced by the chain.
    pub async fn request(&self, method: Method, path: &str, options: RequestOptions) -> ClientResult<Response> {
        let span = info_span!(
            "http_request",
            method = %method,
            url = %path,
            client = %self.name
        );
        let request = Request::with_options(method, path, options);
        let mut ctx = MiddlewareContext::new(request)
            .with_credentials(self.credentials.clone())
            .with_span(span.clone());

        self.pipeline.call(&mut ctx).instrument(span).await
    }

    /// `GET`
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get(&self, path: &str, options: RequestOptions) -> ClientResult<Response> {
        self.request(Method::GET, path, options).await
    }

    /// `DELETE`
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn delete(&self, path: &str, options: RequestOptions) -> ClientResult<Response> {
        self.request(Method::DELETE, path, options).await
    }

    /// `POST` with a body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn post(&self, path: &str, body: impl Into<Body> + Send, options: RequestOptions) -> ClientResult<Response> {
        self.request(Method::POST, path, options.body(body)).await
    }

    /// `PUT` with a body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn put(&self, path: &str, body: impl Into<Body> + Send, options: RequestOptions) -> ClientResult<Response> {
        self.request(Method::PUT, path, options.body(body)).await
    }

    /// `PATCH` with a body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn patch(&self, path: &str, body: impl Into<Body> + Send, options: RequestOptions) -> ClientResult<Response> {
        self.request(Method::PATCH, path, options.body(body)).await
    }

    /// `GET` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the body does not decode into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> ClientResult<T> {
        self.get(path, options).await?.json()
    }

    /// `POST` a serialized body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Returns a validation error if either side fails to (de)serialize.
    pub async fn post_json<B, T>(&self, path: &str, body: &B, options: RequestOptions) -> ClientResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let body = Body::json(body)?;
        self.post(path, body, options).await?.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use crate::error::TransportError;
    use crate::transport::{TransportRequest, TransportResponse};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};

    #[derive(Default)]
    struct Capture {
        requests: Mutex<Vec<TransportRequest>>,
    }

    #[async_trait]
    impl Transport for Capture {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
            self.requests.lock().push(request);
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok(TransportResponse {
                status: StatusCode::OK,
                headers,
                body: br#"{"id": 7}"#.to_vec(),
            })
        }
    }

    fn client(transport: Arc<Capture>) -> RestClient {
        RestClient::new(
            ClientConfig::new("https://api.example.com/v1")
                .with_credentials(CredentialProvider::bearer("tok"))
                .with_default_header("accept", "application/json")
                .with_transport(transport),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = RestClient::new(ClientConfig::new("http://api.example.com")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Config);
    }

    #[test]
    fn test_chain_order() {
        let client = RestClient::new(
            ClientConfig::new("https://api.example.com")
                .with_circuit_breaker(Arc::new(CircuitBreaker::with_defaults()))
                .with_rate_limiter(Arc::new(RateLimiter::new(crate::RateLimiterConfig::default())))
                .with_retry(crate::RetryConfig::default())
                .with_transport(Arc::new(Capture::default())),
        )
        .unwrap();

        assert_eq!(
            client.middleware_names(),
            vec![
                "request_id",
                "user_agent",
                "circuit_breaker",
                "rate_limit",
                "retry",
                "logging"
            ]
        );
    }

    #[tokio::test]
    async fn test_headers_and_auth_applied() {
        let transport = Arc::new(Capture::default());
        let client = client(transport.clone());

        let response = client.get("/issues/7", RequestOptions::new()).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let sent = transport.requests.lock();
        let request = &sent[0];
        assert_eq!(request.url.as_str(), "https://api.example.com/v1/issues/7");
        assert_eq!(request.headers["authorization"], "Bearer tok");
        assert_eq!(request.headers["accept"], "application/json");
        assert!(request.headers.contains_key("x-request-id"));
        assert!(request.headers.contains_key("user-agent"));
    }

    #[tokio::test]
    async fn test_skip_auth() {
        let transport = Arc::new(Capture::default());
        let client = client(transport.clone());

        client.get("/public", RequestOptions::new().skip_auth()).await.unwrap();

        assert!(!transport.requests.lock()[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        #[derive(serde::Deserialize)]
        struct Created {
            id: u64,
        }

        let transport = Arc::new(Capture::default());
        let client = client(transport.clone());

        let created: Created = client
            .post_json("/issues", &serde_json::json!({"title": "crash"}), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(created.id, 7);

        let sent = transport.requests.lock();
        assert_eq!(sent[0].method, Method::POST);
        assert_eq!(sent[0].headers[CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_default_headers_override_generated_values() {
        let transport = Arc::new(Capture::default());
        let client = RestClient::new(
            ClientConfig::new("https://api.example.com")
                .with_default_header("User-Agent", "my-sdk/2.0")
                .with_default_header("X-Request-Id", "fixed-1")
                .with_transport(transport.clone()),
        )
        .unwrap();

        client.get("/ping", RequestOptions::new()).await.unwrap();
        client
            .get("/ping", RequestOptions::new().header("user-agent", "one-off"))
            .await
            .unwrap();

        let sent = transport.requests.lock();
        assert_eq!(sent[0].headers["user-agent"], "my-sdk/2.0");
        assert_eq!(sent[0].headers["x-request-id"], "fixed-1");
        assert_eq!(sent[1].headers["user-agent"], "one-off");
    }
}
