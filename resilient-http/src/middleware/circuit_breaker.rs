//! Circuit breaker middleware.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Middleware, Next};
use crate::circuit_breaker::CircuitBreaker;
use crate::context::MiddlewareContext;
use crate::error::ClientResult;
use crate::response::Response;

/// Fails fast while the breaker is open and records every outcome.
#[derive(Debug, Clone)]
pub struct CircuitBreakerMiddleware {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerMiddleware {
    /// Wrap a shared breaker.
    #[must_use]
    pub const fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }

    /// The wrapped breaker.
    #[must_use]
    pub const fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[async_trait]
impl Middleware for CircuitBreakerMiddleware {
    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    async fn handle(&self, ctx: &mut MiddlewareContext, next: Next<'_>) -> ClientResult<Response> {
        self.breaker.ensure_can_execute()?;

        match next.run(ctx).await {
            Ok(response) => {
                self.breaker.record_success();
                Ok(response)
            }
            Err(err) => {
                if self.breaker.is_failure(&err) {
                    self.breaker.record_failure();
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::error::ClientError;
    use crate::middleware::tests::ok_response;
    use crate::middleware::{Pipeline, Terminal};
    use crate::request::Request;
    use crate::ErrorCode;
    use reqwest::Method;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Scripted {
        status: u16,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Terminal for Scripted {
        async fn call(&self, ctx: &mut MiddlewareContext) -> ClientResult<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.status < 400 {
                Ok(ok_response(&ctx.request))
            } else {
                Err(ClientError::from_status(self.status, "scripted", None, None))
            }
        }
    }

    fn setup(status: u16) -> (Arc<CircuitBreaker>, Arc<Scripted>, Pipeline) {
        let breaker = Arc::new(CircuitBreaker::new(
            CircuitBreakerConfig::new("api")
                .with_failure_threshold(2)
                .with_reset_timeout(Duration::from_secs(1)),
        ));
        let terminal = Arc::new(Scripted {
            status,
            calls: AtomicU32::new(0),
        });
        let pipeline = Pipeline::new(
            vec![Arc::new(CircuitBreakerMiddleware::new(breaker.clone()))],
            terminal.clone(),
        );
        (breaker, terminal, pipeline)
    }

    fn ctx() -> MiddlewareContext {
        MiddlewareContext::new(Request::new(Method::GET, "/status"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_fails_fast() {
        let (breaker, terminal, pipeline) = setup(503);

        for _ in 0..2 {
            let err = pipeline.call(&mut ctx()).await.unwrap_err();
            assert_eq!(err.code(), ErrorCode::ServerError);
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = pipeline.call(&mut ctx()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::CircuitOpen);
        assert!(err.retry_after().is_some_and(|d| d <= Duration::from_secs(1)));
        assert_eq!(terminal.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_errors_do_not_count() {
        let (breaker, _terminal, pipeline) = setup(404);

        for _ in 0..5 {
            let _ = pipeline.call(&mut ctx()).await;
        }

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_success_closes() {
        let (breaker, _terminal, pipeline) = setup(200);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(1)).await;
        pipeline.call(&mut ctx()).await.unwrap();

        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
