//! Mock transport for testing.
//!
//! Replies are scripted in order; every request is recorded so tests can
//! assert on what reached the wire.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use resilient_http::{Transport, TransportError, TransportRequest, TransportResponse};
use serde_json::Value;

use crate::fixtures;

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this response
    Response(TransportResponse),
    /// Fail at the transport level
    Error(TransportError),
}

/// Scripted transport with a request log.
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<MockReply>>,
    fallback: Mutex<Option<MockReply>>,
    requests: Mutex<Vec<TransportRequest>>,
    latency: Mutex<Option<Duration>>,
}

impl MockTransport {
    /// Create a mock with no scripted replies.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a reply.
    pub fn push(&self, reply: MockReply) -> &Self {
        self.replies.lock().push_back(reply);
        self
    }

    /// Queue a response.
    pub fn push_response(&self, response: TransportResponse) -> &Self {
        self.push(MockReply::Response(response))
    }

    /// Queue a JSON response.
    pub fn push_json(&self, status: u16, body: &Value) -> &Self {
        self.push_response(fixtures::json_response(status, body))
    }

    /// Queue a transport failure.
    pub fn push_error(&self, message: &str) -> &Self {
        self.push(MockReply::Error(TransportError::new(message)))
    }

    /// Reply used once the queue is empty.
    pub fn set_fallback(&self, reply: MockReply) -> &Self {
        *self.fallback.lock() = Some(reply);
        self
    }

    /// Delay every reply by `latency`.
    pub fn set_latency(&self, latency: Duration) -> &Self {
        *self.latency.lock() = Some(latency);
        self
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Replies still queued.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.replies.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().push(request);

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.replies.lock().pop_front();
        let reply = scripted.or_else(|| self.fallback.lock().clone());
        match reply {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::Error(err)) => Err(err),
            None => Err(TransportError::new("mock transport has no scripted reply")),
        }
    }
}
