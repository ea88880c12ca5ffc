//! Property-based tests for resilient-http.
//!
//! These tests verify universal properties across all inputs using proptest.

use std::time::{Duration, SystemTime};

use proptest::prelude::*;
use resilient_http::retry_after::parse_retry_after_value;
use resilient_http::{
    Backoff, CircuitBreaker, CircuitBreakerConfig, CircuitState, ClientError, QueryValue, RetryConfig,
};

fn backoff() -> impl Strategy<Value = Backoff> {
    (1u64..2_000, 1u64..60_000, 1.0f64..4.0, any::<bool>()).prop_map(|(base, max, multiplier, jitter)| Backoff {
        base_delay: Duration::from_millis(base),
        max_delay: Duration::from_millis(max),
        multiplier,
        jitter,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Delay never exceeds the cap widened by the jitter fraction.
    #[test]
    fn prop_backoff_bounded(backoff in backoff(), attempt in 0u32..40) {
        let delay = backoff.delay_for_attempt(attempt);
        let cap = backoff.max_delay.mul_f64(1.0 + resilient_http::backoff::JITTER_FRACTION);
        prop_assert!(delay <= cap + Duration::from_micros(1), "{delay:?} > {cap:?}");
    }

    // Without jitter the sequence is non-decreasing.
    #[test]
    fn prop_backoff_monotonic_without_jitter(backoff in backoff(), attempt in 0u32..30) {
        let backoff = Backoff { jitter: false, ..backoff };
        prop_assert!(backoff.delay_for_attempt(attempt) <= backoff.delay_for_attempt(attempt + 1));
    }

    // The breaker opens exactly when the threshold is reached.
    #[test]
    fn prop_breaker_opens_at_threshold(threshold in 1u32..20) {
        let breaker = CircuitBreaker::new(
            CircuitBreakerConfig::new("prop")
                .with_failure_threshold(threshold)
                .with_reset_timeout(Duration::from_secs(3600)),
        );
        for _ in 0..threshold - 1 {
            breaker.record_failure();
        }
        prop_assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        prop_assert_eq!(breaker.state(), CircuitState::Open);
        prop_assert!(!breaker.can_execute());
    }

    // Empty strings and nulls never reach the query string.
    #[test]
    fn prop_query_omits_empty(values in proptest::collection::vec("[a-z0-9]{0,6}", 0..8)) {
        let value = QueryValue::Repeated(values.clone());
        let emitted = value.emitted();
        let expected: Vec<&str> = values.iter().map(String::as_str).filter(|v| !v.is_empty()).collect();
        prop_assert_eq!(emitted, expected);
        prop_assert!(QueryValue::Null.emitted().is_empty());
    }

    // Delta-seconds parse exactly.
    #[test]
    fn prop_retry_after_seconds(secs in 0u64..1_000_000) {
        let parsed = parse_retry_after_value(&secs.to_string(), SystemTime::now());
        prop_assert_eq!(parsed, Some(Duration::from_secs(secs)));
    }

    // Non-retryable 4xx statuses are never retried by the default policy.
    #[test]
    fn prop_client_errors_not_retried(status in 400u16..500, attempt in 0u32..5) {
        prop_assume!(status != 429);
        let err = ClientError::from_status(status, "client", None, None);
        prop_assert!(!RetryConfig::default().should_retry(&err, attempt));
        prop_assert!(!err.is_circuit_failure());
    }

    // Retryability and breaker accounting agree for every server error.
    #[test]
    fn prop_server_errors_consistent(status in 500u16..600) {
        let err = ClientError::from_status(status, "server", None, None);
        prop_assert!(err.is_retryable());
        prop_assert!(err.is_circuit_failure());
        prop_assert_eq!(err.status(), Some(status));
    }
}
