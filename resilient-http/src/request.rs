//! Outbound request model.

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, ClientResult};

/// A query parameter value. Null and empty values are omitted from the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    /// Omitted from the query string
    Null,
    /// Emitted once
    Scalar(String),
    /// Emitted as one `key=value` pair per element
    Repeated(Vec<String>),
}

impl QueryValue {
    /// The values that will actually be written, in order.
    #[must_use]
    pub fn emitted(&self) -> Vec<&str> {
        match self {
            Self::Null => Vec::new(),
            Self::Scalar(value) => {
                if value.is_empty() {
                    Vec::new()
                } else {
                    vec![value.as_str()]
                }
            }
            Self::Repeated(values) => values
                .iter()
                .map(String::as_str)
                .filter(|v| !v.is_empty())
                .collect(),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

macro_rules! scalar_query_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for QueryValue {
            fn from(value: $ty) -> Self {
                Self::Scalar(value.to_string())
            }
        })*
    };
}

scalar_query_value!(bool, i32, i64, u16, u32, u64, usize, f64);

impl<T: Into<Self>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: ToString> From<Vec<T>> for QueryValue {
    fn from(values: Vec<T>) -> Self {
        Self::Repeated(values.iter().map(ToString::to_string).collect())
    }
}

/// One part of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    /// Field name
    pub name: String,
    /// Raw content
    pub data: Vec<u8>,
    /// Optional file name
    pub file_name: Option<String>,
    /// Optional part content type
    pub content_type: Option<String>,
}

/// A multipart form. The transport chooses the boundary header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    /// Parts in order
    pub parts: Vec<FormPart>,
}

impl MultipartForm {
    /// Create an empty form.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            data: value.into().into_bytes(),
            file_name: None,
            content_type: None,
        });
        self
    }

    /// Add a file field.
    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            data,
            file_name: Some(file_name.into()),
            content_type: Some(content_type.into()),
        });
        self
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Structured value, serialized as JSON
    Json(Value),
    /// Sent as-is
    Text(String),
    /// Raw bytes, no JSON content type
    Binary(Vec<u8>),
    /// Multipart form data, no JSON content type
    Multipart(MultipartForm),
}

impl Body {
    /// Serialize any value into a JSON body.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the value cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> ClientResult<Self> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|e| ClientError::validation_with_source("request body is not serializable", e))
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

impl From<MultipartForm> for Body {
    fn from(value: MultipartForm) -> Self {
        Self::Multipart(value)
    }
}

/// Per-request options accepted by the client entry points.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra headers, overriding client defaults
    pub headers: Vec<(String, String)>,
    /// Payload
    pub body: Option<Body>,
    /// Query parameters in order
    pub query: Vec<(String, QueryValue)>,
    /// Timeout override
    pub timeout: Option<Duration>,
    /// Caller cancellation
    pub cancellation: Option<CancellationToken>,
    /// Free-form metadata visible to middleware
    pub metadata: Map<String, Value>,
    /// Return the body as raw bytes regardless of content type
    pub raw_response: bool,
    /// Do not ask the credential provider for headers
    pub skip_auth: bool,
}

impl RequestOptions {
    /// Create empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Override the timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Force raw binary response handling.
    #[must_use]
    pub const fn raw_response(mut self) -> Self {
        self.raw_response = true;
        self
    }

    /// Skip credential headers.
    #[must_use]
    pub const fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }
}

/// A request as it travels through the middleware chain.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Absolute URL or path relative to the base URL
    pub url: String,
    /// Headers; names compare case-insensitively
    pub headers: Vec<(String, String)>,
    /// Payload
    pub body: Option<Body>,
    /// Query parameters
    pub query: Vec<(String, QueryValue)>,
    /// Timeout override
    pub timeout: Option<Duration>,
    /// Caller cancellation
    pub cancellation: Option<CancellationToken>,
    /// Free-form metadata
    pub metadata: Map<String, Value>,
    /// Return the body as raw bytes
    pub raw_response: bool,
    /// Skip credential headers
    pub skip_auth: bool,
}

impl Request {
    /// Create a request with no options.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self::with_options(method, url, RequestOptions::default())
    }

    /// Create a request from options.
    #[must_use]
    pub fn with_options(method: Method, url: impl Into<String>, options: RequestOptions) -> Self {
        Self {
            method,
            url: url.into(),
            headers: options.headers,
            body: options.body,
            query: options.query,
            timeout: options.timeout,
            cancellation: options.cancellation,
            metadata: options.metadata,
            raw_response: options.raw_response,
            skip_auth: options.skip_auth,
        }
    }

    /// Look up a header value, ignoring name case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Check if a header is present, ignoring name case.
    #[must_use]
    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Set a header, replacing any existing value with the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }
}
