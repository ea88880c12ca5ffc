//! Shared test utilities for resilient-http.
//!
//! This crate provides:
//! - A scripted mock transport with a request log
//! - Response fixtures
//! - Proptest generators for client types
//! - A tracing initializer for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;
pub mod tracing;

pub use generators::*;
pub use mocks::{MockReply, MockTransport};
pub use tracing::init_test_tracing;
