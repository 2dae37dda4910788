//! Transport-level request and response types.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use http::header::RETRY_AFTER;
use http::{HeaderMap, Method, StatusCode};
use serde_json::Value;
use smol_str::SmolStr;

use crate::key::{RequestKey, normalize_path, resource_of};

/// Ordered query parameters.
///
/// Insertion order is kept for the wire; [`RequestKey`] sorts them when
/// deriving the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(SmolStr, SmolStr)>);

impl Params {
    /// Creates an empty parameter list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a parameter, builder style.
    pub fn with(mut self, name: impl Into<SmolStr>, value: impl fmt::Display) -> Self {
        self.push(name, value);
        self
    }

    /// Appends a parameter.
    pub fn push(&mut self, name: impl Into<SmolStr>, value: impl fmt::Display) {
        self.0.push((name.into(), SmolStr::from(value.to_string())));
    }

    /// Appends a parameter only when `value` is present.
    pub fn with_opt<V: fmt::Display>(self, name: impl Into<SmolStr>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with(name, value),
            None => self,
        }
    }

    /// Returns `true` when there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<SmolStr>,
    V: fmt::Display,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.push(k, v);
        }
        params
    }
}

/// A call to the backend, independent of the HTTP client used to send it.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the configured base URL, normalized.
    pub path: SmolStr,
    /// Query parameters.
    pub params: Params,
    /// JSON body for mutations.
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Creates a request with no params and no body.
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: normalize_path(path),
            params: Params::new(),
            body: None,
        }
    }

    /// Creates a `GET` request.
    pub fn get(path: &str, params: Params) -> Self {
        Self::new(Method::GET, path).params(params)
    }

    /// Replaces the query parameters.
    pub fn params(self, params: Params) -> Self {
        Self { params, ..self }
    }

    /// Sets the JSON body.
    pub fn body(self, body: Value) -> Self {
        Self {
            body: Some(body),
            ..self
        }
    }

    /// Derives the request key shared by the cache and the lock table.
    pub fn key(&self) -> RequestKey {
        match &self.body {
            Some(body) => RequestKey::with_body(self.method.clone(), &self.path, &self.params, body),
            None => RequestKey::new(self.method.clone(), &self.path, &self.params),
        }
    }

    /// First path segment, e.g. `transactions`.
    pub fn resource(&self) -> Option<&str> {
        resource_of(&self.path)
    }

    /// Returns `true` for `GET` requests.
    pub fn is_read(&self) -> bool {
        self.method == Method::GET
    }
}

/// Raw backend reply as received by a transport.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Undecoded body.
    pub body: Bytes,
}

impl ApiResponse {
    /// Creates a response with no headers.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Server-requested cooldown from the `Retry-After` header.
    ///
    /// Only the delta-seconds form is understood; HTTP dates are ignored.
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get(RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }
}
