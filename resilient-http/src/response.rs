//! Response model produced by the execution engine.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ClientError, ClientResult};
use crate::request::Request;

/// Parsed response body, chosen by content negotiation.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// No content
    Empty,
    /// `application/json` (or `+json`) payload
    Json(Value),
    /// Textual payload
    Text(String),
    /// Raw bytes
    Binary(Vec<u8>),
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Canonical reason phrase
    pub status_text: String,
    /// Response headers
    pub headers: HeaderMap,
    /// Parsed body
    pub body: ResponseBody,
    /// The request that produced this response
    pub request: Request,
    /// Time spent in the transport
    pub elapsed: Duration,
}

impl Response {
    /// Decode the JSON body into a typed value.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the body is not JSON or does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        match &self.body {
            ResponseBody::Json(value) => T::deserialize(value).map_err(|e| {
                ClientError::validation_with_source("response body does not match expected shape", e)
            }),
            ResponseBody::Empty => T::deserialize(Value::Null).map_err(|e| {
                ClientError::validation_with_source("response body is empty", e)
            }),
            ResponseBody::Text(_) | ResponseBody::Binary(_) => Err(ClientError::validation(
                format!("response from {} is not JSON", self.request.url),
            )),
        }
    }

    /// Body as text, if it is textual or JSON.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        match &self.body {
            ResponseBody::Text(text) => Some(text.clone()),
            ResponseBody::Json(value) => Some(value.to_string()),
            ResponseBody::Empty => Some(String::new()),
            ResponseBody::Binary(_) => None,
        }
    }

    /// Body as raw bytes, if binary.
    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.body {
            ResponseBody::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Header value as a string, if present and valid.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
