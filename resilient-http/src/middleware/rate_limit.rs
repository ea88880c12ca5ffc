//! Rate limiter middleware.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Middleware, Next};
use crate::context::MiddlewareContext;
use crate::error::ClientResult;
use crate::rate_limiter::RateLimiter;
use crate::response::Response;

/// Admits calls through a shared sliding-window limiter.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    /// Wrap a shared limiter.
    #[must_use]
    pub const fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn handle(&self, ctx: &mut MiddlewareContext, next: Next<'_>) -> ClientResult<Response> {
        self.limiter.acquire().await?;
        next.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::tests::ok_response;
    use crate::middleware::{Pipeline, Terminal};
    use crate::rate_limiter::RateLimiterConfig;
    use crate::request::Request;
    use crate::ErrorCode;
    use reqwest::Method;
    use std::time::Duration;
    use tokio::time::Instant;

    struct Ok200;

    #[async_trait]
    impl Terminal for Ok200 {
        async fn call(&self, ctx: &mut MiddlewareContext) -> ClientResult<Response> {
            Ok(ok_response(&ctx.request))
        }
    }

    fn pipeline(wait: bool) -> Pipeline {
        let limiter = Arc::new(RateLimiter::new(
            RateLimiterConfig::new(2, Duration::from_millis(1000)).with_wait_for_slot(wait),
        ));
        Pipeline::new(vec![Arc::new(RateLimitMiddleware::new(limiter))], Arc::new(Ok200))
    }

    fn ctx() -> MiddlewareContext {
        MiddlewareContext::new(Request::new(Method::GET, "/search"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_call_rejected() {
        let pipeline = pipeline(false);
        pipeline.call(&mut ctx()).await.unwrap();
        pipeline.call(&mut ctx()).await.unwrap();

        let err = pipeline.call(&mut ctx()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RateLimited);
        let wait = err.retry_after().unwrap();
        assert!(wait > Duration::ZERO && wait <= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_call_waits() {
        let pipeline = pipeline(true);
        let start = Instant::now();
        for _ in 0..3 {
            pipeline.call(&mut ctx()).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }
}
