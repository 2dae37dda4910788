#![warn(missing_docs)]
//! # manjaka-core
//!
//! Core types for the Maria Manjaka bookkeeping API client.
//!
//! This crate holds the protocol-level vocabulary shared by the cache, the
//! coordination layer and the HTTP transport:
//!
//! - **Identify** requests ([`RequestKey`]) so caching and single-flight locking
//!   agree on one key space
//! - **Describe** outgoing calls and raw replies ([`ApiRequest`], [`ApiResponse`])
//! - **Unwrap** the backend's `{success, message, data}` [`Envelope`]
//! - **Call** the backend through the [`Transport`] trait
//! - **Tell time** through an injectable [`Clock`]
//! - **Hold** the auth session and runtime navigation ([`SessionStore`], [`Navigator`])
//!
//! ## Feature Flags
//!
//! - `test-helpers` - Exposes [`ManualClock`] for deterministic TTL tests
//!

pub mod clock;
pub mod envelope;
pub mod error;
pub mod key;
pub mod request;
pub mod session;
pub mod transport;

#[cfg(any(test, feature = "test-helpers"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use envelope::Envelope;
pub use error::ApiError;
pub use key::RequestKey;
pub use request::{ApiRequest, ApiResponse, Params};
pub use session::{
    MemorySessionStore, Navigator, NoopNavigator, SessionGuard, SessionStore, Teardown,
};
pub use transport::Transport;

#[doc(hidden)]
pub use smol_str::SmolStr;

/// HTTP method re-exported from the `http` crate.
pub use http::Method;
/// HTTP status code re-exported from the `http` crate.
pub use http::StatusCode;
