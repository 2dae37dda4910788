#![warn(missing_docs)]
//! # manjaka-cache
//!
//! In-memory response cache for the Maria Manjaka API client.
//!
//! [`ResponseCache`] stores the unwrapped payload of successful `GET` calls,
//! keyed by [`RequestKey`](manjaka_core::RequestKey), and forgets them once
//! their time-to-live has elapsed:
//!
//! - reads evict expired entries lazily, so an expired value is never served
//! - mutations invalidate single keys or whole families by regex
//! - an optional [`CleanupTask`] sweeps expired entries on a timer to bound memory
//!
//! ```
//! use manjaka_cache::ResponseCache;
//! use manjaka_core::{Method, Params, RequestKey};
//! use serde_json::json;
//!
//! let cache = ResponseCache::builder().build();
//! let key = RequestKey::new(Method::GET, "/comptes", &Params::new());
//!
//! cache.set(key.clone(), json!([{"id": 1, "nom": "Caisse"}]));
//! assert!(cache.get(&key).is_some());
//!
//! cache.invalidate(&key);
//! assert!(cache.get(&key).is_none());
//! ```

mod builder;
mod cache;
mod cleanup;
mod entry;
pub mod metrics;

pub use builder::ResponseCacheBuilder;
pub use cache::ResponseCache;
pub use cleanup::CleanupTask;
pub use entry::{CacheEntry, TtlClass};
