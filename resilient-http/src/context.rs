//! Per-call state threaded through the middleware chain.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::Span;

use crate::auth::CredentialProvider;
use crate::request::Request;

/// State for one logical call.
///
/// Retries reuse the same context, so `attempt` is visible to every
/// middleware below the retry middleware and to the execution engine.
#[derive(Debug)]
pub struct MiddlewareContext {
    /// The request being executed
    pub request: Request,
    /// Credential provider resolved for this call
    pub credentials: Option<Arc<CredentialProvider>>,
    /// Span every middleware logs within
    pub span: Span,
    /// Zero-indexed attempt, updated by the retry middleware
    pub attempt: u32,
    /// Open bag for middleware-to-middleware data
    pub metadata: Map<String, Value>,
}

impl MiddlewareContext {
    /// Create a context for a request with no credentials.
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self {
            request,
            credentials: None,
            span: Span::none(),
            attempt: 0,
            metadata: Map::new(),
        }
    }

    /// Attach a credential provider.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<Arc<CredentialProvider>>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Attach the span for this call.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}
