//! Request correlation id.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{Middleware, Next};
use crate::context::MiddlewareContext;
use crate::error::ClientResult;
use crate::response::Response;

/// Header carrying the correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Metadata key the id is recorded under.
pub const REQUEST_ID_METADATA: &str = "request_id";

/// Sets `x-request-id` to a UUID v4 unless the caller supplied one.
///
/// The header is written into the shared request, so retries reuse it.
#[derive(Debug, Clone, Default)]
pub struct RequestIdMiddleware {
    fixed: Option<String>,
}

impl RequestIdMiddleware {
    /// Create a request-id middleware.
    #[must_use]
    pub const fn new() -> Self {
        Self { fixed: None }
    }

    /// Use `id` instead of generating one, as when the client configures a
    /// default `x-request-id` header.
    #[must_use]
    pub fn with_fixed_id(id: impl Into<String>) -> Self {
        Self {
            fixed: Some(id.into()),
        }
    }
}

#[async_trait]
impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        "request_id"
    }

    async fn handle(&self, ctx: &mut MiddlewareContext, next: Next<'_>) -> ClientResult<Response> {
        let id = match ctx.request.header(REQUEST_ID_HEADER) {
            Some(existing) => existing.to_string(),
            None => {
                let id = self
                    .fixed
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                ctx.request.set_header(REQUEST_ID_HEADER, id.clone());
                id
            }
        };
        ctx.metadata
            .insert(REQUEST_ID_METADATA.to_string(), Value::String(id));
        next.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::tests::ok_response;
    use crate::middleware::{Pipeline, Terminal};
    use crate::request::{Request, RequestOptions};
    use reqwest::Method;
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl Terminal for Echo {
        async fn call(&self, ctx: &mut MiddlewareContext) -> ClientResult<Response> {
            Ok(ok_response(&ctx.request))
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(vec![Arc::new(RequestIdMiddleware::new())], Arc::new(Echo))
    }

    #[tokio::test]
    async fn test_generates_id() {
        let mut ctx = MiddlewareContext::new(Request::new(Method::GET, "/"));
        let response = pipeline().call(&mut ctx).await.unwrap();

        let id = response.request.header(REQUEST_ID_HEADER).unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(ctx.metadata[REQUEST_ID_METADATA], id);
    }

    #[tokio::test]
    async fn test_keeps_caller_id() {
        let request = Request::with_options(
            Method::GET,
            "/",
            RequestOptions::new().header("X-Request-ID", "abc-123"),
        );
        let mut ctx = MiddlewareContext::new(request);
        let response = pipeline().call(&mut ctx).await.unwrap();

        assert_eq!(response.request.header(REQUEST_ID_HEADER), Some("abc-123"));
        assert_eq!(response.request.headers.len(), 1);
    }

    #[tokio::test]
    async fn test_fixed_id_used_when_absent() {
        let pipeline = Pipeline::new(
            vec![Arc::new(RequestIdMiddleware::with_fixed_id("batch-9"))],
            Arc::new(Echo),
        );
        let mut ctx = MiddlewareContext::new(Request::new(Method::GET, "/"));
        let response = pipeline.call(&mut ctx).await.unwrap();

        assert_eq!(response.request.header(REQUEST_ID_HEADER), Some("batch-9"));
        assert_eq!(ctx.metadata[REQUEST_ID_METADATA], "batch-9");
    }
}
