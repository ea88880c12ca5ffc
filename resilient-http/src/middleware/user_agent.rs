//! Default `user-agent` header.

use async_trait::async_trait;

use super::{Middleware, Next};
use crate::config::DEFAULT_USER_AGENT;
use crate::context::MiddlewareContext;
use crate::error::ClientResult;
use crate::response::Response;

/// Sets `user-agent` unless the request already has one.
#[derive(Debug, Clone)]
pub struct UserAgentMiddleware {
    user_agent: String,
}

impl Default for UserAgentMiddleware {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

impl UserAgentMiddleware {
    /// Use the given user agent.
    #[must_use]
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl Middleware for UserAgentMiddleware {
    fn name(&self) -> &'static str {
        "user_agent"
    }

    async fn handle(&self, ctx: &mut MiddlewareContext, next: Next<'_>) -> ClientResult<Response> {
        if !ctx.request.has_header("user-agent") {
            ctx.request.set_header("user-agent", self.user_agent.clone());
        }
        next.run(ctx).await
    }
}
