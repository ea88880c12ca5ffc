//! Request/response logging with header redaction.

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{Middleware, Next};
use crate::context::MiddlewareContext;
use crate::error::ClientResult;
use crate::response::Response;

/// Header name fragments whose values are never logged.
const SENSITIVE_PATTERNS: &[&str] = &[
    "authorization",
    "cookie",
    "token",
    "secret",
    "password",
    "api-key",
    "api_key",
    "apikey",
    "credential",
    "session",
];

const REDACTED: &str = "[REDACTED]";

/// Check if a header name may carry a secret.
#[must_use]
pub fn is_sensitive_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Render headers for logs, masking sensitive values.
#[must_use]
pub fn redact_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if is_sensitive_header(name) {
                REDACTED.to_string()
            } else {
                value.clone()
            };
            (name.clone(), shown)
        })
        .collect()
}

/// Logs each attempt's request and outcome inside the call span.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    /// Create a logging middleware.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(&self, ctx: &mut MiddlewareContext, next: Next<'_>) -> ClientResult<Response> {
        debug!(
            parent: &ctx.span,
            method = %ctx.request.method,
            url = %ctx.request.url,
            attempt = ctx.attempt,
            headers = ?redact_headers(&ctx.request.headers),
            "HTTP request"
        );

        let started = Instant::now();
        let result = next.run(ctx).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(response) => debug!(
                parent: &ctx.span,
                status = response.status.as_u16(),
                elapsed_ms,
                "HTTP response"
            ),
            Err(err) => warn!(
                parent: &ctx.span,
                code = %err.code(),
                status = ?err.status(),
                elapsed_ms,
                error = %err,
                "HTTP request failed"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_header_detection() {
        assert!(is_sensitive_header("Authorization"));
        assert!(is_sensitive_header("X-Api-Key"));
        assert!(is_sensitive_header("set-cookie"));
        assert!(is_sensitive_header("x-refresh-token"));
        assert!(!is_sensitive_header("content-type"));
        assert!(!is_sensitive_header("x-request-id"));
    }

    #[test]
    fn test_redaction_keeps_names() {
        let headers = vec![
            ("authorization".to_string(), "Bearer abc".to_string()),
            ("accept".to_string(), "application/json".to_string()),
        ];
        let shown = redact_headers(&headers);
        assert_eq!(shown[0], ("authorization".to_string(), REDACTED.to_string()));
        assert_eq!(shown[1].1, "application/json");
    }
}
