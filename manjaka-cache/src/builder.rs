//! Builder for configuring [`ResponseCache`].

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use manjaka_core::{Clock, SystemClock};
use smol_str::SmolStr;

use crate::cache::ResponseCache;
use crate::entry::TtlClass;

/// Builder for creating and configuring a [`ResponseCache`].
///
/// Use [`ResponseCache::builder`] for JSON payloads or
/// [`ResponseCacheBuilder::new`] for any other payload type.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use manjaka_cache::ResponseCache;
/// use manjaka_core::SystemClock;
///
/// let cache = ResponseCache::builder()
///     .label("ledger")
///     .default_ttl(Duration::from_secs(120))
///     .clock(Arc::new(SystemClock))
///     .build();
/// assert_eq!(cache.default_ttl(), Duration::from_secs(120));
/// ```
pub struct ResponseCacheBuilder<V> {
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    label: SmolStr,
    _value: PhantomData<fn() -> V>,
}

impl<V> ResponseCacheBuilder<V> {
    /// Creates a builder with the system clock and a 5 minute default TTL.
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            default_ttl: TtlClass::Default.default_ttl(),
            label: SmolStr::new_static("responses"),
            _value: PhantomData,
        }
    }

    /// Sets the clock used to stamp and age entries.
    ///
    /// # Default
    ///
    /// [`SystemClock`]
    pub fn clock(self, clock: Arc<dyn Clock>) -> Self {
        Self { clock, ..self }
    }

    /// Sets the TTL applied by [`ResponseCache::set`].
    ///
    /// # Default
    ///
    /// 5 minutes
    pub fn default_ttl(self, ttl: Duration) -> Self {
        Self {
            default_ttl: ttl,
            ..self
        }
    }

    /// Sets the label used in logs and metrics.
    ///
    /// # Default
    ///
    /// `"responses"`
    pub fn label(self, label: impl Into<SmolStr>) -> Self {
        Self {
            label: label.into(),
            ..self
        }
    }

    /// Builds the cache.
    pub fn build(self) -> ResponseCache<V> {
        ResponseCache::from_parts(self.clock, self.default_ttl, self.label)
    }
}

impl<V> Default for ResponseCacheBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}
