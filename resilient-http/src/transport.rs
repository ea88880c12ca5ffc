//! Pluggable transport and the default reqwest implementation.
//!
//! The execution engine hands a fully resolved [`TransportRequest`] to a
//! [`Transport`]. Timeouts and cancellation are enforced above this layer,
//! so a transport only needs to perform one exchange.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use url::Url;

use crate::error::{ClientError, ClientResult, TransportError};
use crate::request::MultipartForm;

/// Outbound payload after serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportBody {
    /// Pre-encoded bytes
    Bytes(Vec<u8>),
    /// Multipart form; the transport writes the boundary header
    Multipart(MultipartForm),
}

/// A request ready for the wire.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method
    pub method: Method,
    /// Final URL including query string
    pub url: Url,
    /// Merged headers
    pub headers: HeaderMap,
    /// Payload
    pub body: Option<TransportBody>,
}

/// A completed exchange before body parsing.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Full response body
    pub body: Vec<u8>,
}

/// Performs one HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and read the full response.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no response could be obtained.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Connection settings for [`ReqwestTransport`].
///
/// Provides sensible defaults for production use with connection pooling.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connection timeout (default: 10s)
    pub connect_timeout: Duration,
    /// Pool idle timeout (default: 90s)
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host (default: 10)
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
        }
    }
}

impl TransportConfig {
    /// Set a custom connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set custom pool settings.
    #[must_use]
    pub const fn with_pool_config(mut self, idle_timeout: Duration, max_idle: usize) -> Self {
        self.pool_idle_timeout = idle_timeout;
        self.pool_max_idle_per_host = max_idle;
        self
    }
}

/// Transport backed by a pooled `reqwest::Client` with rustls.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport from the given settings.
    ///
    /// # Errors
    ///
    /// Returns a network error if the client cannot be built (e.g., TLS
    /// initialization fails).
    pub fn new(config: &TransportConfig) -> ClientResult<Self> {
        let client = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .use_rustls_tls()
            .build()
            .map_err(|e| ClientError::from(TransportError::with_source("failed to build HTTP client", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn multipart_form(form: MultipartForm) -> Result<reqwest::multipart::Form, TransportError> {
    let mut out = reqwest::multipart::Form::new();
    for part in form.parts {
        let mut piece = reqwest::multipart::Part::bytes(part.data);
        if let Some(file_name) = part.file_name {
            piece = piece.file_name(file_name);
        }
        if let Some(content_type) = part.content_type {
            piece = piece
                .mime_str(&content_type)
                .map_err(|e| TransportError::with_source(format!("invalid part content type {content_type}"), e))?;
        }
        out = out.part(part.name, piece);
    }
    Ok(out)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        builder = match request.body {
            Some(TransportBody::Bytes(bytes)) => builder.body(bytes),
            Some(TransportBody::Multipart(form)) => builder.multipart(multipart_form(form)?),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::with_source(format!("request failed: {e}"), e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::with_source(format!("failed to read response body: {e}"), e))?;

        Ok(TransportResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
