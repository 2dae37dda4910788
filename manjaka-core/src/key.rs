//! Request key derivation.
//!
//! A [`RequestKey`] identifies a backend call by `(method, path, params, body)`.
//! The response cache and the single-flight lock table are both keyed by it,
//! so two calls that should share a cached value or an in-flight request must
//! produce equal keys, and calls that must not share must produce different
//! ones.
//!
//! ## Format
//!
//! Keys render to a compact string that pattern invalidation matches against:
//!
//! `{METHOD}:{path}[?k1=v1&k2=v2][#{json-body}]`
//!
//! - The path always starts with `/` and never ends with one (except the root)
//! - Params are sorted by name, then value, so argument order does not matter
//! - Param names and values are form-urlencoded, so a value containing `&`,
//!   `=` or `#` cannot pose as another param or as a body
//! - The body section is omitted when there is no body
//!
//! ```
//! use manjaka_core::{Method, Params, RequestKey};
//!
//! let a = RequestKey::new(
//!     Method::GET,
//!     "transactions/",
//!     &Params::new().with("limit", 50).with("categorieId", 3),
//! );
//! let b = RequestKey::new(
//!     Method::GET,
//!     "/transactions",
//!     &Params::new().with("categorieId", 3).with("limit", 50),
//! );
//! assert_eq!(a, b);
//! assert_eq!(a.as_str(), "GET:/transactions?categorieId=3&limit=50");
//! ```

use std::fmt;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use http::Method;
use serde_json::Value;
use smol_str::SmolStr;
use url::form_urlencoded;

use crate::request::Params;

#[derive(Debug)]
struct RequestKeyInner {
    method: Method,
    path: SmolStr,
    rendered: String,
}

/// Deterministic identity of a backend call.
///
/// Cloning is O(1): the key data lives behind an [`Arc`].
#[derive(Clone)]
pub struct RequestKey {
    inner: Arc<RequestKeyInner>,
}

impl RequestKey {
    /// Builds a key for a call without a body.
    pub fn new(method: Method, path: &str, params: &Params) -> Self {
        Self::build(method, path, params, None)
    }

    /// Builds a key for a call carrying a JSON body.
    pub fn with_body(method: Method, path: &str, params: &Params, body: &Value) -> Self {
        Self::build(method, path, params, Some(body))
    }

    fn build(method: Method, path: &str, params: &Params, body: Option<&Value>) -> Self {
        let path = normalize_path(path);
        let mut rendered = format!("{}:{}", method, path);

        let mut pairs: Vec<(&str, &str)> = params.iter().collect();
        pairs.sort_unstable();
        for (i, (name, value)) in pairs.iter().enumerate() {
            rendered.push(if i == 0 { '?' } else { '&' });
            rendered.extend(form_urlencoded::byte_serialize(name.as_bytes()));
            rendered.push('=');
            rendered.extend(form_urlencoded::byte_serialize(value.as_bytes()));
        }

        if let Some(body) = body {
            // serde_json's Display renders compact JSON; object key order is
            // insertion order, so identical bodies built the same way match.
            let _ = write!(rendered, "#{}", body);
        }

        Self {
            inner: Arc::new(RequestKeyInner {
                method,
                path,
                rendered,
            }),
        }
    }

    /// HTTP method of the call.
    #[inline]
    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    /// Normalized path of the call.
    #[inline]
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// First path segment, e.g. `transactions` for `/transactions/12/valider`.
    pub fn resource(&self) -> Option<&str> {
        resource_of(&self.inner.path)
    }

    /// Rendered key string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.inner.rendered
    }
}

impl PartialEq for RequestKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.rendered == other.inner.rendered
    }
}

impl Eq for RequestKey {}

impl Hash for RequestKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.rendered.hash(state);
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.rendered)
    }
}

impl fmt::Debug for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestKey")
            .field(&self.inner.rendered)
            .finish()
    }
}

/// Ensures a leading slash and strips trailing ones.
pub(crate) fn normalize_path(path: &str) -> SmolStr {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        SmolStr::new_static("/")
    } else {
        SmolStr::from(format!("/{}", trimmed))
    }
}

/// Returns the first segment of a normalized path.
pub(crate) fn resource_of(path: &str) -> Option<&str> {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_without_params() {
        let key = RequestKey::new(Method::GET, "comptes", &Params::new());
        assert_eq!(key.as_str(), "GET:/comptes");
        assert_eq!(key.resource(), Some("comptes"));
    }

    #[test]
    fn test_key_distinguishes_methods_and_params() {
        let params = Params::new().with("limit", 10);
        let get = RequestKey::new(Method::GET, "/transactions", &params);
        let delete = RequestKey::new(Method::DELETE, "/transactions", &params);
        let other = RequestKey::new(Method::GET, "/transactions", &Params::new().with("limit", 20));

        assert_ne!(get, delete);
        assert_ne!(get, other);
    }

    #[test]
    fn test_param_separators_in_values_are_encoded() {
        let smuggled = RequestKey::new(
            Method::GET,
            "/transactions",
            &Params::new().with("categorieId", "1&dateDebut=2024"),
        );
        let split = RequestKey::new(
            Method::GET,
            "/transactions",
            &Params::new().with("categorieId", 1).with("dateDebut", 2024),
        );

        assert_ne!(smuggled, split);
        assert_eq!(
            smuggled.as_str(),
            "GET:/transactions?categorieId=1%26dateDebut%3D2024"
        );
        assert_eq!(split.as_str(), "GET:/transactions?categorieId=1&dateDebut=2024");
    }

    #[test]
    fn test_hash_in_value_is_not_a_body() {
        let with_param = RequestKey::new(
            Method::POST,
            "/notes",
            &Params::new().with("q", "#\"a\""),
        );
        let with_body = RequestKey::with_body(
            Method::POST,
            "/notes",
            &Params::new().with("q", ""),
            &json!("a"),
        );
        assert_ne!(with_param, with_body);
    }

    #[test]
    fn test_key_with_body() {
        let body = json!({"montant": 1500, "type": "recette"});
        let key = RequestKey::with_body(Method::POST, "/transactions", &Params::new(), &body);
        assert_eq!(
            key.as_str(),
            r#"POST:/transactions#{"montant":1500,"type":"recette"}"#
        );
    }

    #[test]
    fn test_root_path() {
        let key = RequestKey::new(Method::GET, "", &Params::new());
        assert_eq!(key.as_str(), "GET:/");
        assert_eq!(key.resource(), None);
    }

    #[test]
    fn test_nested_resource() {
        let key = RequestKey::new(Method::GET, "/comptes/4/solde/", &Params::new());
        assert_eq!(key.path(), "/comptes/4/solde");
        assert_eq!(key.resource(), Some("comptes"));
    }
}
