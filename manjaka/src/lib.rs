//! # manjaka
//!
//! Request coordination for the Maria Manjaka bookkeeping API.
//!
//! [`ApiClient`] sits between the application and a [`Transport`] and makes
//! every call cheap, bounded and resilient:
//!
//! - identical reads inside their TTL are served from the [`ResponseCache`]
//! - identical reads in flight at the same time share one network call
//! - no more than a fixed number of calls are on the wire at once
//! - transient failures are retried with exponential backoff
//! - mutations drop the cached reads they make stale and publish
//!   [`RefreshEvent`]s
//!
//! The HTTP transport lives in `manjaka-reqwest`; any other [`Transport`]
//! works the same way.
//!
//! ## Feature Flags
//!
//! - `metrics` - Records request, retry, lock and cache metrics through the
//!   `metrics` crate
#![warn(missing_docs)]

/// Client configuration loaded from code, YAML or the environment.
pub mod config;

/// Refresh notifications published after mutations.
pub mod events;

/// Bounded concurrency for outbound requests.
///
/// [`ConcurrencyGate`](gate::ConcurrencyGate) admits at most N requests and
/// queues the rest in arrival order.
pub mod gate;

/// Resource relations driving cache invalidation after mutations.
pub mod invalidation;

/// Per-key single-flight locking.
pub mod lock;

/// Metrics for request coordination.
pub mod metrics;

/// Failure classification and retry with backoff.
pub mod retry;

mod client;

pub use client::{ApiClient, ApiClientBuilder, RequestOptions};
pub use config::{ClientConfig, ConcurrencyLimit, ConfigError};
pub use events::{EventBus, RefreshEvent};
pub use gate::{ConcurrencyGate, GatePermit};
pub use invalidation::InvalidationRules;
pub use lock::RequestLockManager;
pub use retry::{FailureClass, RetryPolicy, Sleeper, TokioSleeper};

pub use manjaka_cache::{ResponseCache, TtlClass};
pub use manjaka_core::{
    ApiError, ApiRequest, ApiResponse, Method, Params, RequestKey, SessionStore, StatusCode,
    Transport,
};
