//! HTTP execution engine.
//!
//! The terminal handler of every chain. It turns a [`Request`] into a wire
//! request, enforces the timeout and caller cancellation, and classifies the
//! outcome. It never retries; that is the retry middleware's job.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::context::MiddlewareContext;
use crate::error::{ClientError, ClientResult};
use crate::middleware::Terminal;
use crate::request::{Body, Request};
use crate::response::{Response, ResponseBody};
use crate::retry_after::parse_retry_after;
use crate::transport::{Transport, TransportBody, TransportRequest, TransportResponse};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Terminal handler that performs the HTTP exchange.
#[derive(Clone)]
pub struct HttpExecutor {
    base_url: Url,
    default_headers: Vec<(String, String)>,
    timeout: Duration,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for HttpExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExecutor")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpExecutor {
    /// Create an executor.
    #[must_use]
    pub fn new(
        base_url: Url,
        default_headers: Vec<(String, String)>,
        timeout: Duration,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            base_url,
            default_headers,
            timeout,
            transport,
        }
    }

    /// Resolve the final URL including the query string.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the joined URL does not parse.
    pub fn resolve_url(&self, request: &Request) -> ClientResult<Url> {
        let mut url = match Url::parse(&request.url) {
            Ok(absolute) if matches!(absolute.scheme(), "http" | "https") => absolute,
            _ => {
                let joined = format!(
                    "{}/{}",
                    self.base_url.as_str().trim_end_matches('/'),
                    request.url.trim_start_matches('/')
                );
                Url::parse(&joined)
                    .map_err(|e| ClientError::validation_with_source(format!("invalid request URL {joined}"), e))?
            }
        };

        let pairs: Vec<(&str, &str)> = request
            .query
            .iter()
            .flat_map(|(key, value)| value.emitted().into_iter().map(move |v| (key.as_str(), v)))
            .collect();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }

    /// Merge default, request and credential headers, later entries winning.
    async fn build_headers(&self, ctx: &MiddlewareContext) -> ClientResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        insert_all(&mut headers, &self.default_headers)?;
        insert_all(&mut headers, &ctx.request.headers)?;

        if !ctx.request.skip_auth {
            if let Some(credentials) = &ctx.credentials {
                let auth = credentials.auth_headers().await?;
                insert_all(&mut headers, &auth)?;
            }
        }
        Ok(headers)
    }

    /// Resolve headers and perform the exchange. The caller bounds this with
    /// the timeout and cancellation, so a slow credential refresh is covered.
    async fn exchange(&self, ctx: &MiddlewareContext) -> ClientResult<(TransportResponse, Duration)> {
        let url = self.resolve_url(&ctx.request)?;
        let mut headers = self.build_headers(ctx).await?;
        let body = encode_body(ctx.request.body.as_ref(), &mut headers)?;
        let method = ctx.request.method.clone();

        debug!(
            parent: &ctx.span,
            method = %method,
            url = %url,
            attempt = ctx.attempt,
            "Dispatching request"
        );

        let wire = TransportRequest {
            method,
            url,
            headers,
            body,
        };

        let started = Instant::now();
        let raw = self.transport.send(wire).await?;
        Ok((raw, started.elapsed()))
    }

    async fn send(&self, ctx: &MiddlewareContext) -> ClientResult<(TransportResponse, Duration)> {
        let timeout = ctx.request.timeout.unwrap_or(self.timeout);
        let exchange = tokio::time::timeout(timeout, self.exchange(ctx));

        let outcome = match &ctx.request.cancellation {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => return Err(ClientError::Aborted),
                    outcome = exchange => outcome,
                }
            }
            None => exchange.await,
        };

        outcome.unwrap_or(Err(ClientError::Timeout { duration: timeout }))
    }
}

fn insert_all(headers: &mut HeaderMap, pairs: &[(String, String)]) -> ClientResult<()> {
    for (name, value) in pairs {
        let header_name = HeaderName::from_str(name)
            .map_err(|e| ClientError::validation_with_source(format!("invalid header name {name}"), e))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| ClientError::validation_with_source(format!("invalid value for header {name}"), e))?;
        headers.insert(header_name, header_value);
    }
    Ok(())
}

fn encode_body(body: Option<&Body>, headers: &mut HeaderMap) -> ClientResult<Option<TransportBody>> {
    let Some(body) = body else {
        return Ok(None);
    };
    let encoded = match body {
        Body::Json(value) => {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            }
            TransportBody::Bytes(serde_json::to_vec(value)?)
        }
        Body::Text(text) => TransportBody::Bytes(text.clone().into_bytes()),
        Body::Binary(bytes) => TransportBody::Bytes(bytes.clone()),
        Body::Multipart(form) => {
            // the transport writes its own boundary
            headers.remove(CONTENT_TYPE);
            TransportBody::Multipart(form.clone())
        }
    };
    Ok(Some(encoded))
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
}

fn is_json(mime: &str) -> bool {
    mime == JSON_CONTENT_TYPE || mime.ends_with("+json")
}

fn is_textual(mime: &str) -> bool {
    mime.starts_with("text/")
        || mime.ends_with("/xml")
        || mime.ends_with("+xml")
        || mime == "application/x-www-form-urlencoded"
}

/// Choose the body representation from the content type.
fn parse_body(raw: Vec<u8>, headers: &HeaderMap, force_binary: bool) -> Result<ResponseBody, serde_json::Error> {
    if force_binary {
        return Ok(ResponseBody::Binary(raw));
    }
    if raw.is_empty() {
        return Ok(ResponseBody::Empty);
    }
    match content_type(headers) {
        Some(mime) if is_json(&mime) => serde_json::from_slice(&raw).map(ResponseBody::Json),
        Some(mime) if !is_textual(&mime) => Ok(ResponseBody::Binary(raw)),
        _ => Ok(String::from_utf8(raw).map_or_else(
            |e| ResponseBody::Binary(e.into_bytes()),
            ResponseBody::Text,
        )),
    }
}

/// Pick a human readable message out of an error body.
fn error_message(details: Option<&Value>, fallback: &str) -> String {
    details
        .and_then(|body| {
            ["message", "error_description", "error"]
                .iter()
                .find_map(|field| body.get(field).and_then(Value::as_str))
        })
        .map_or_else(|| fallback.to_string(), str::to_string)
}

#[async_trait]
impl Terminal for HttpExecutor {
    async fn call(&self, ctx: &mut MiddlewareContext) -> ClientResult<Response> {
        let (raw, elapsed) = self.send(ctx).await?;

        let status = raw.status;
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        debug!(
            parent: &ctx.span,
            status = status.as_u16(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "Response received"
        );

        if status.is_success() {
            let body = parse_body(raw.body, &raw.headers, ctx.request.raw_response).map_err(|e| {
                ClientError::validation_with_source(format!("invalid JSON in {status} response"), e)
            })?;
            return Ok(Response {
                status,
                status_text,
                headers: raw.headers,
                body,
                request: ctx.request.clone(),
                elapsed,
            });
        }

        let details = match parse_body(raw.body, &raw.headers, false) {
            Ok(ResponseBody::Json(value)) => Some(value),
            Ok(ResponseBody::Text(text)) => Some(Value::String(text)),
            _ => None,
        };
        let retry_after = if status.as_u16() == 429 {
            parse_retry_after(&raw.headers, SystemTime::now())
        } else {
            None
        };
        let fallback = if status_text.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            status_text
        };
        let message = error_message(details.as_ref(), &fallback);

        Err(ClientError::from_status(status.as_u16(), message, details, retry_after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{QueryValue, RequestOptions};
    use reqwest::Method;

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn send(&self, _request: TransportRequest) -> Result<TransportResponse, crate::TransportError> {
            Err(crate::TransportError::new("unreachable"))
        }
    }

    fn executor(base: &str) -> HttpExecutor {
        HttpExecutor::new(
            Url::parse(base).unwrap(),
            Vec::new(),
            Duration::from_secs(5),
            Arc::new(Unreachable),
        )
    }

    #[test]
    fn test_relative_url_joined_to_base() {
        let exec = executor("https://api.example.com/v2/");
        let url = exec.resolve_url(&Request::new(Method::GET, "/issues")).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v2/issues");

        let exec = executor("https://api.example.com/v2");
        let url = exec.resolve_url(&Request::new(Method::GET, "issues")).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v2/issues");
    }

    #[test]
    fn test_absolute_url_used_verbatim() {
        let exec = executor("https://api.example.com/v2");
        let url = exec
            .resolve_url(&Request::new(Method::GET, "https://uploads.example.com/f/1"))
            .unwrap();
        assert_eq!(url.as_str(), "https://uploads.example.com/f/1");
    }

    #[test]
    fn test_query_repeats_and_omits() {
        let exec = executor("https://api.example.com");
        let options = RequestOptions::new()
            .query("label", vec!["bug", "ui"])
            .query("assignee", QueryValue::Null)
            .query("state", "")
            .query("page", 2_u32);
        let url = exec
            .resolve_url(&Request::with_options(Method::GET, "/issues", options))
            .unwrap();
        assert_eq!(url.query(), Some("label=bug&label=ui&page=2"));
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let mut headers = HeaderMap::new();
        let body = encode_body(Some(&Body::Json(serde_json::json!({"a": 1}))), &mut headers).unwrap();
        assert_eq!(headers[CONTENT_TYPE], JSON_CONTENT_TYPE);
        assert_eq!(body, Some(TransportBody::Bytes(br#"{"a":1}"#.to_vec())));
    }

    #[test]
    fn test_text_and_binary_bodies_leave_content_type() {
        let mut headers = HeaderMap::new();
        encode_body(Some(&Body::Text("raw".to_string())), &mut headers).unwrap();
        encode_body(Some(&Body::Binary(vec![0, 1])), &mut headers).unwrap();
        assert!(!headers.contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_content_negotiation() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/problem+json; charset=utf-8"));
        assert!(matches!(
            parse_body(br#"{"x":1}"#.to_vec(), &headers, false),
            Ok(ResponseBody::Json(_))
        ));
        assert!(matches!(
            parse_body(br#"{"x":1}"#.to_vec(), &headers, true),
            Ok(ResponseBody::Binary(_))
        ));
        assert!(parse_body(b"not json".to_vec(), &headers, false).is_err());

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/png"));
        assert!(matches!(
            parse_body(vec![0x89, 0x50], &headers, false),
            Ok(ResponseBody::Binary(_))
        ));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert_eq!(
            parse_body(b"hi".to_vec(), &headers, false).unwrap(),
            ResponseBody::Text("hi".to_string())
        );
        assert_eq!(parse_body(Vec::new(), &headers, false).unwrap(), ResponseBody::Empty);
    }

    #[test]
    fn test_error_message_extraction() {
        let body = serde_json::json!({"error": "invalid_grant", "error_description": "expired"});
        assert_eq!(error_message(Some(&body), "Bad Request"), "expired");
        assert_eq!(error_message(Some(&serde_json::json!({"code": 7})), "Bad Request"), "Bad Request");
        assert_eq!(error_message(None, "Not Found"), "Not Found");
    }

    #[tokio::test]
    async fn test_invalid_header_is_validation_error() {
        let exec = executor("https://api.example.com");
        let request = Request::with_options(
            Method::GET,
            "/x",
            RequestOptions::new().header("bad header", "v"),
        );
        let err = exec.call(&mut MiddlewareContext::new(request)).await.unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Validation);
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let exec = executor("https://api.example.com");
        let err = exec
            .call(&mut MiddlewareContext::new(Request::new(Method::GET, "/x")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Network);
    }

    struct StalledRefresher;

    #[async_trait]
    impl crate::auth::TokenRefresher for StalledRefresher {
        async fn refresh(&self, _refresh_token: &str) -> ClientResult<crate::auth::TokenResponse> {
            tokio::time::sleep(Duration::from_secs(20)).await;
            Err(ClientError::token_refresh("stalled", None))
        }
    }

    fn stalled_oauth2() -> Option<Arc<crate::auth::CredentialProvider>> {
        let credentials = crate::auth::OAuth2Credentials::with_refresher(
            crate::auth::OAuth2Config::new("https://auth.example.com/token", "sdk"),
            crate::auth::TokenSet::new("old", Some("r1".to_string())).with_expires_at(chrono::Utc::now()),
            Arc::new(StalledRefresher),
        );
        Some(Arc::new(crate::auth::CredentialProvider::OAuth2(credentials)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_covers_credential_refresh() {
        let exec = executor("https://api.example.com");
        let request = Request::with_options(
            Method::GET,
            "/x",
            RequestOptions::new().timeout(Duration::from_millis(100)),
        );
        let mut ctx = MiddlewareContext::new(request).with_credentials(stalled_oauth2());

        let started = Instant::now();
        let err = exec.call(&mut ctx).await.unwrap_err();

        assert_eq!(err.code(), crate::ErrorCode::Timeout);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_covers_credential_refresh() {
        let exec = executor("https://api.example.com");
        let token = tokio_util::sync::CancellationToken::new();
        let request = Request::with_options(
            Method::GET,
            "/x",
            RequestOptions::new().cancellation(token.clone()),
        );
        let mut ctx = MiddlewareContext::new(request).with_credentials(stalled_oauth2());

        let cancel = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });
        let started = Instant::now();
        let err = exec.call(&mut ctx).await.unwrap_err();
        cancel.await.unwrap();

        assert_eq!(err.code(), crate::ErrorCode::Aborted);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
