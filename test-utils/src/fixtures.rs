//! Canned transport responses and payloads.

use std::time::{Duration, SystemTime};

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use resilient_http::TransportResponse;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Response with a JSON body.
#[must_use]
pub fn json_response(code: u16, body: &Value) -> TransportResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    TransportResponse {
        status: status(code),
        headers,
        body: body.to_string().into_bytes(),
    }
}

/// Response with a `text/plain` body.
#[must_use]
pub fn text_response(code: u16, body: &str) -> TransportResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    TransportResponse {
        status: status(code),
        headers,
        body: body.as_bytes().to_vec(),
    }
}

/// Response with no body.
#[must_use]
pub fn empty_response(code: u16) -> TransportResponse {
    TransportResponse {
        status: status(code),
        headers: HeaderMap::new(),
        body: Vec::new(),
    }
}

/// 429 with `Retry-After` in delta-seconds.
#[must_use]
pub fn rate_limited_response(retry_after_secs: u64) -> TransportResponse {
    let mut response = json_response(429, &json!({"message": "Too many requests"}));
    if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
        response.headers.insert(RETRY_AFTER, value);
    }
    response
}

/// 429 with `Retry-After` as an HTTP-date `delay` from now.
#[must_use]
pub fn rate_limited_until(delay: Duration) -> TransportResponse {
    let mut response = json_response(429, &json!({"message": "Too many requests"}));
    let at = httpdate::fmt_http_date(SystemTime::now() + delay);
    if let Ok(value) = HeaderValue::from_str(&at) {
        response.headers.insert(RETRY_AFTER, value);
    }
    response
}

/// Token endpoint success body.
#[must_use]
pub fn token_body(access_token: &str, refresh_token: Option<&str>, expires_in: Option<u64>) -> Value {
    let mut body = json!({
        "access_token": access_token,
        "token_type": "Bearer",
    });
    if let Some(refresh_token) = refresh_token {
        body["refresh_token"] = json!(refresh_token);
    }
    if let Some(expires_in) = expires_in {
        body["expires_in"] = json!(expires_in);
    }
    body
}

/// Sample resource used by round-trip tests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleIssue {
    /// Issue id
    pub id: u64,
    /// Title
    pub title: String,
    /// Labels
    pub labels: Vec<String>,
}

impl SampleIssue {
    /// A sample crash report.
    #[must_use]
    pub fn crash() -> Self {
        Self {
            id: 42,
            title: "App crashes on launch".to_string(),
            labels: vec!["bug".to_string(), "p1".to_string()],
        }
    }

    /// As a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
