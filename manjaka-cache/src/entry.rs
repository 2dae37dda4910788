//! Cached values and TTL classes.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A cached payload with the time it was stored and when it expires.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    value: V,
    stored_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    /// Creates an entry stored at `stored_at` living for `ttl`.
    pub fn new(value: V, stored_at: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let expires_at = stored_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            value,
            stored_at,
            expires_at,
        }
    }

    /// Returns a reference to the cached payload.
    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// When the entry was written.
    #[inline]
    pub fn stored_at(&self) -> DateTime<Utc> {
        self.stored_at
    }

    /// When the entry stops being served.
    #[inline]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// An entry written at `t` with TTL `T` is expired for every `now >= t + T`.
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Extracts the payload.
    pub fn into_value(self) -> V {
        self.value
    }
}

/// Freshness class of a resource.
///
/// Reference data (accounts, categories) changes rarely and is kept longer;
/// transactional data is kept briefly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlClass {
    /// Reference data, 10 minutes by default.
    Static,
    /// Everything else, 5 minutes by default.
    #[default]
    Default,
    /// Frequently changing data, 1 minute by default.
    Dynamic,
}

impl TtlClass {
    /// Built-in TTL for the class.
    pub const fn default_ttl(self) -> Duration {
        match self {
            TtlClass::Static => Duration::from_secs(10 * 60),
            TtlClass::Default => Duration::from_secs(5 * 60),
            TtlClass::Dynamic => Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let t0 = Utc::now();
        let entry = CacheEntry::new("comptes", t0, Duration::from_millis(5000));

        assert!(!entry.is_expired(t0));
        assert!(!entry.is_expired(t0 + TimeDelta::milliseconds(4999)));
        assert!(entry.is_expired(t0 + TimeDelta::milliseconds(5000)));
        assert!(entry.is_expired(t0 + TimeDelta::milliseconds(6000)));
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let entry = CacheEntry::new((), Utc::now(), Duration::MAX);
        assert_eq!(entry.expires_at(), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_class_defaults() {
        assert_eq!(TtlClass::Static.default_ttl(), Duration::from_secs(600));
        assert_eq!(TtlClass::Default.default_ttl(), Duration::from_secs(300));
        assert_eq!(TtlClass::Dynamic.default_ttl(), Duration::from_secs(60));
    }
}
