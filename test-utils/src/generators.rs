//! Shared proptest generators.

use std::time::Duration;

use proptest::prelude::*;
use resilient_http::{Backoff, ClientError, QueryValue};

/// Any status the server can answer with.
pub fn status_strategy() -> impl Strategy<Value = u16> {
    100u16..=599
}

/// Non-2xx statuses.
pub fn error_status_strategy() -> impl Strategy<Value = u16> {
    prop_oneof![400u16..=499, 500u16..=599]
}

/// 4xx statuses the client never retries.
pub fn non_retryable_status_strategy() -> impl Strategy<Value = u16> {
    (400u16..=499).prop_filter("429 is retryable", |s| *s != 429)
}

/// Errors that default policies treat as transient.
pub fn retryable_error_strategy() -> impl Strategy<Value = ClientError> {
    prop_oneof![
        "[a-z ]{1,20}".prop_map(ClientError::network),
        (1u64..60_000).prop_map(|ms| ClientError::Timeout {
            duration: Duration::from_millis(ms)
        }),
        (500u16..=599).prop_map(|s| ClientError::from_status(s, "server", None, None)),
        proptest::option::of(0u64..120).prop_map(|secs| {
            ClientError::from_status(429, "slow down", None, secs.map(Duration::from_secs))
        }),
    ]
}

/// Any error kind that can come out of the chain.
pub fn client_error_strategy() -> impl Strategy<Value = ClientError> {
    prop_oneof![
        retryable_error_strategy(),
        error_status_strategy().prop_map(|s| ClientError::from_status(s, "status", None, None)),
        Just(ClientError::Aborted),
        "[a-z ]{1,20}".prop_map(ClientError::validation),
        (1u64..30_000).prop_map(|ms| ClientError::circuit_open("api", Duration::from_millis(ms))),
        Just(ClientError::TokenExpired),
        Just(ClientError::token_refresh_config("missing refresh token")),
    ]
}

/// Query values including omitted shapes.
pub fn query_value_strategy() -> impl Strategy<Value = QueryValue> {
    prop_oneof![
        Just(QueryValue::Null),
        "[a-z0-9]{0,8}".prop_map(QueryValue::Scalar),
        proptest::collection::vec("[a-z0-9]{0,6}", 0..5).prop_map(QueryValue::Repeated),
    ]
}

/// Backoff parameters with millisecond bases.
pub fn backoff_strategy() -> impl Strategy<Value = Backoff> {
    (1u64..2_000, 1u64..60_000, 1.0f64..4.0, any::<bool>()).prop_map(|(base, max, multiplier, jitter)| Backoff {
        base_delay: Duration::from_millis(base),
        max_delay: Duration::from_millis(max),
        multiplier,
        jitter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn retryable_errors_are_retryable(err in retryable_error_strategy()) {
            prop_assert!(err.is_retryable());
        }

        #[test]
        fn non_retryable_statuses_stay_put(status in non_retryable_status_strategy()) {
            prop_assert!(!ClientError::from_status(status, "x", None, None).is_retryable());
        }
    }
}
