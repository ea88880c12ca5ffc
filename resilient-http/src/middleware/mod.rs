//! Middleware composition.
//!
//! A middleware receives the call context and a [`Next`] handle to the rest
//! of the chain. It may short-circuit, call `next` once, or call it several
//! times (retry). The composer adds no behavior beyond ordering: the first
//! middleware in a list is the outermost.
//!
//! ```text
//! circuit breaker → rate limiter → retry → user middleware → HttpExecutor
//! ```

pub mod circuit_breaker;
pub mod logging;
pub mod rate_limit;
pub mod request_id;
pub mod retry;
pub mod user_agent;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::context::MiddlewareContext;
use crate::error::ClientResult;
use crate::response::Response;

pub use circuit_breaker::CircuitBreakerMiddleware;
pub use logging::LoggingMiddleware;
pub use rate_limit::RateLimitMiddleware;
pub use request_id::{REQUEST_ID_HEADER, REQUEST_ID_METADATA, RequestIdMiddleware};
pub use retry::{RetryConfig, RetryMiddleware, RetryPredicate};
pub use user_agent::UserAgentMiddleware;

/// A composable unit wrapping the rest of the chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Process the call, optionally delegating to `next`.
    async fn handle(&self, ctx: &mut MiddlewareContext, next: Next<'_>) -> ClientResult<Response>;
}

/// The handler at the end of the chain.
#[async_trait]
pub trait Terminal: Send + Sync {
    /// Execute the fully prepared request.
    async fn call(&self, ctx: &mut MiddlewareContext) -> ClientResult<Response>;
}

/// Handle to the remainder of the chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    tail: Tail<'a>,
}

#[derive(Clone, Copy)]
enum Tail<'a> {
    Terminal(&'a dyn Terminal),
    Outer(&'a Next<'a>),
}

impl<'a> Next<'a> {
    /// Start of a chain over `middleware` ending in `terminal`.
    #[must_use]
    pub fn new(middleware: &'a [Arc<dyn Middleware>], terminal: &'a dyn Terminal) -> Self {
        Self {
            middleware,
            tail: Tail::Terminal(terminal),
        }
    }

    /// Invoke the rest of the chain.
    pub fn run<'c>(self, ctx: &'c mut MiddlewareContext) -> BoxFuture<'c, ClientResult<Response>>
    where
        'a: 'c,
    {
        match self.middleware.split_first() {
            Some((current, rest)) => current.handle(
                ctx,
                Next {
                    middleware: rest,
                    tail: self.tail,
                },
            ),
            None => match self.tail {
                Tail::Terminal(terminal) => terminal.call(ctx),
                Tail::Outer(outer) => outer.run(ctx),
            },
        }
    }
}

/// An ordered middleware list bound to a terminal handler.
#[derive(Clone)]
pub struct Pipeline {
    middleware: Vec<Arc<dyn Middleware>>,
    terminal: Arc<dyn Terminal>,
}

impl Pipeline {
    /// Build a chain; `middleware[0]` is the outermost.
    #[must_use]
    pub fn new(middleware: Vec<Arc<dyn Middleware>>, terminal: Arc<dyn Terminal>) -> Self {
        Self {
            middleware,
            terminal,
        }
    }

    /// Names of the installed middleware, outermost first.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    /// Run one call through the chain.
    ///
    /// # Errors
    ///
    /// Returns whatever error the chain produces.
    pub async fn call(&self, ctx: &mut MiddlewareContext) -> ClientResult<Response> {
        Next::new(&self.middleware, self.terminal.as_ref())
            .run(ctx)
            .await
    }
}

/// Fold several middleware into one that behaves like installing them in order.
#[must_use]
pub fn compose(middleware: Vec<Arc<dyn Middleware>>) -> Arc<dyn Middleware> {
    Arc::new(Composed { middleware })
}

struct Composed {
    middleware: Vec<Arc<dyn Middleware>>,
}

#[async_trait]
impl Middleware for Composed {
    fn name(&self) -> &'static str {
        "composed"
    }

    async fn handle(&self, ctx: &mut MiddlewareContext, next: Next<'_>) -> ClientResult<Response> {
        let inner = Next {
            middleware: &self.middleware,
            tail: Tail::Outer(&next),
        };
        inner.run(ctx).await
    }
}
