//! Cache invalidation after mutations.

use std::collections::BTreeMap;

use manjaka_cache::ResponseCache;
use regex::Regex;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::lock::RequestLockManager;

/// Which cached reads go stale when a resource is mutated.
///
/// A mutation of `/{resource}/...` always invalidates cached reads of that
/// resource; the rules add related resources whose server-side values depend
/// on it (a new transaction changes account balances and statistics).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationRules {
    related: BTreeMap<SmolStr, Vec<SmolStr>>,
}

impl InvalidationRules {
    /// Rules with no related resources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds rules from a resource to related-resources map.
    pub fn from_map(map: &BTreeMap<String, Vec<String>>) -> Self {
        map.iter().fold(Self::new(), |rules, (resource, related)| {
            rules.relate(resource.as_str(), related.iter().map(String::as_str))
        })
    }

    /// Adds related resources to `resource`.
    pub fn relate<I, S>(mut self, resource: impl Into<SmolStr>, related: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.related
            .entry(resource.into())
            .or_default()
            .extend(related.into_iter().map(Into::into));
        self
    }

    /// Resources affected by a mutation of `resource`, the resource itself first.
    pub fn affected(&self, resource: &str) -> Vec<SmolStr> {
        let mut affected = vec![SmolStr::new(resource)];
        for related in self.related.get(resource).into_iter().flatten() {
            if !affected.contains(related) {
                affected.push(related.clone());
            }
        }
        affected
    }

    /// Regex matching cached read keys of any of `resources`.
    ///
    /// Matches `GET:/stats`, `GET:/stats/annuel` and `GET:/stats?annee=2024`
    /// but not `GET:/statsArchive`.
    pub fn pattern(resources: &[SmolStr]) -> Result<Regex, regex::Error> {
        let alternatives = resources
            .iter()
            .map(|resource| regex::escape(resource))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"^GET:/(?:{alternatives})(?:[/?#]|$)"))
    }

    /// Removes the cached reads affected by a mutation of `resource`, and the
    /// request locks that could still hand out their previous values.
    ///
    /// Returns the affected resources and the number of cache entries removed.
    pub fn apply(
        &self,
        cache: &ResponseCache,
        locks: &RequestLockManager,
        resource: &str,
    ) -> (Vec<SmolStr>, usize) {
        let affected = self.affected(resource);
        let removed = match Self::pattern(&affected) {
            Ok(pattern) => {
                locks.forget_matching(&pattern);
                cache.invalidate_pattern(&pattern)
            }
            Err(error) => {
                warn!(%error, resource, "could not build invalidation pattern");
                0
            }
        };
        debug!(resource, ?affected, removed, "invalidated after mutation");
        (affected, removed)
    }
}
