//! The API client facade.
//!
//! [`ApiClient`] is what the rest of the application talks to. Reads go
//! through the response cache and the single-flight lock; every call that
//! reaches the network is admitted by the concurrency gate, retried on
//! transient failures, and has its `{success, message, data}` envelope
//! unwrapped. Successful mutations invalidate the cached reads they affect
//! and publish refresh events.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use manjaka_cache::{CleanupTask, ResponseCache, TtlClass};
use manjaka_core::{
    ApiError, ApiRequest, Clock, Envelope, Method, Params, RequestKey, SessionStore, SystemClock,
    Transport,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use smol_str::SmolStr;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{Instrument, debug, debug_span, info, trace, warn};

use crate::config::{CacheConfig, ClientConfig};
use crate::events::{EventBus, RefreshEvent};
use crate::gate::ConcurrencyGate;
use crate::invalidation::InvalidationRules;
use crate::lock::RequestLockManager;
use crate::metrics;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};

/// Per-call overrides for reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Explicit TTL for the cached result.
    pub ttl: Option<Duration>,
    /// TTL class for the cached result, used when `ttl` is unset.
    pub class: Option<TtlClass>,
    /// Skip the cache read and fetch a fresh value. The result is still cached.
    pub refresh: bool,
}

impl RequestOptions {
    /// Caches the result for `ttl`.
    pub fn with_ttl(self, ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..self
        }
    }

    /// Caches the result with the TTL of `class`.
    pub fn with_class(self, class: TtlClass) -> Self {
        Self {
            class: Some(class),
            ..self
        }
    }

    /// Bypasses cached values for this call.
    pub fn refresh(self) -> Self {
        Self {
            refresh: true,
            ..self
        }
    }
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    cache: ResponseCache,
    locks: RequestLockManager,
    gate: ConcurrencyGate,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    timeout: Duration,
    ttl: CacheConfig,
    invalidation: InvalidationRules,
    events: EventBus,
    session: Option<Arc<dyn SessionStore>>,
    login_endpoint: SmolStr,
    _cleanup: Option<CleanupTask>,
}

impl ClientInner {
    fn ttl_for(&self, resource: Option<&str>, options: &RequestOptions) -> Duration {
        options.ttl.unwrap_or_else(|| {
            let class = options
                .class
                .unwrap_or_else(|| self.ttl.class_of(resource));
            self.ttl.ttl(class)
        })
    }

    /// Gate, retry, and envelope unwrapping around the transport.
    async fn execute(self: &Arc<Self>, request: ApiRequest) -> Result<Value, ApiError> {
        let _permit = self.gate.acquire().await?;
        self.retry
            .run(self.sleeper.as_ref(), |attempt| {
                let inner = self.clone();
                let request = request.clone();
                async move { inner.attempt(request, attempt).await }
            })
            .await
    }

    async fn attempt(&self, request: ApiRequest, attempt: u32) -> Result<Value, ApiError> {
        let method = request.method.clone();
        let path = request.path.clone();
        let started = Instant::now();

        let outcome = match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(Ok(response)) if response.is_success() => {
                Envelope::<Value>::from_slice(&response.body).and_then(Envelope::into_data)
            }
            Ok(Ok(response)) => Err(ApiError::from_response(&response)),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(ApiError::Timeout(self.timeout)),
        };

        let elapsed = started.elapsed();
        metrics::record_request(
            method.as_str(),
            if outcome.is_ok() { "success" } else { "error" },
            elapsed,
        );
        match &outcome {
            Ok(_) => trace!(
                %method,
                %path,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                "request succeeded"
            ),
            Err(error) => debug!(%method, %path, attempt, %error, "request failed"),
        }
        outcome
    }
}

/// Client for the bookkeeping API.
///
/// Cheap to clone; clones share the cache, the lock table, the concurrency
/// gate and the event bus.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use manjaka::ApiClient;
/// use manjaka_core::{ApiError, ApiRequest, ApiResponse, Params, StatusCode, Transport};
///
/// struct Accounts;
///
/// #[async_trait]
/// impl Transport for Accounts {
///     async fn send(&self, _request: ApiRequest) -> Result<ApiResponse, ApiError> {
///         Ok(ApiResponse::new(
///             StatusCode::OK,
///             r#"{"success":true,"data":[{"id":1,"nom":"Caisse"}]}"#,
///         ))
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), ApiError> {
/// let client = ApiClient::builder(Accounts).build();
/// let accounts: serde_json::Value = client.get("/comptes", Params::new()).await?;
/// assert_eq!(accounts[0]["nom"], "Caisse");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("cache", &self.inner.cache)
            .field("locks", &self.inner.locks)
            .field("gate", &self.inner.gate)
            .field("retry", &self.inner.retry)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Starts building a client sending requests through `transport`.
    pub fn builder(transport: impl Transport + 'static) -> ApiClientBuilder {
        ApiClientBuilder::new(Arc::new(transport))
    }

    /// Creates a client from a configuration with default clock and sleeper.
    pub fn new(transport: impl Transport + 'static, config: ClientConfig) -> Self {
        Self::builder(transport).config(config).build()
    }

    /// Reads `path` and deserializes the envelope's `data`.
    pub async fn get<T>(&self, path: &str, params: Params) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        self.get_with(path, params, RequestOptions::default()).await
    }

    /// Reads `path` with per-call overrides.
    pub async fn get_with<T>(
        &self,
        path: &str,
        params: Params,
        options: RequestOptions,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let value = self.read(ApiRequest::get(path, params), options).await?;
        serde_json::from_value(value).map_err(ApiError::decode)
    }

    /// Creates a resource.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.mutate_json(Method::POST, path, Some(body)).await
    }

    /// Replaces a resource.
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.mutate_json(Method::PUT, path, Some(body)).await
    }

    /// Partially updates a resource.
    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.mutate_json(Method::PATCH, path, Some(body)).await
    }

    /// Deletes a resource.
    pub async fn delete<T>(&self, path: &str) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        self.mutate_json::<Value, T>(Method::DELETE, path, None).await
    }

    /// Sends a prepared request: cached and coalesced for `GET`, a mutation otherwise.
    pub async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        if request.is_read() {
            self.read(request, RequestOptions::default()).await
        } else {
            self.mutate(request).await
        }
    }

    async fn mutate_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = ApiRequest::new(method, path);
        if let Some(body) = body {
            request = request.body(serde_json::to_value(body).map_err(ApiError::encode)?);
        }
        let value = self.mutate(request).await?;
        serde_json::from_value(value).map_err(ApiError::decode)
    }

    async fn read(&self, request: ApiRequest, options: RequestOptions) -> Result<Value, ApiError> {
        let key = request.key();
        if !options.refresh
            && let Some(value) = self.inner.cache.get(&key)
        {
            return Ok(value);
        }

        if options.refresh {
            self.inner.locks.forget(&key);
        }

        let ttl = self.inner.ttl_for(request.resource(), &options);
        let inner = self.inner.clone();
        let span = debug_span!("api_read", %key);
        let cache_key = key.clone();

        self.inner
            .locks
            .with_lock(key, move || {
                async move {
                    let value = inner.execute(request).await?;
                    inner.cache.set_with_ttl(cache_key, value.clone(), ttl);
                    Ok(value)
                }
                .instrument(span)
            })
            .await
    }

    async fn mutate(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let method = request.method.clone();
        let path = request.path.clone();
        let resource = request.resource().map(SmolStr::new);

        let value = self
            .inner
            .execute(request)
            .instrument(debug_span!("api_mutation", %method, %path))
            .await?;

        if let Some(resource) = resource {
            let (affected, removed) =
                self.inner
                    .invalidation
                    .apply(&self.inner.cache, &self.inner.locks, &resource);
            debug!(%method, %path, removed, "mutation applied");
            self.inner
                .events
                .publish_for(affected.iter().map(SmolStr::as_str));
        }
        Ok(value)
    }

    /// Exchanges credentials for a session.
    ///
    /// The returned `token` and `user` are stored in the session store, and the
    /// cache is cleared so that nothing fetched for a previous user survives.
    /// Returns the user profile.
    pub async fn login<C>(&self, credentials: &C) -> Result<Value, ApiError>
    where
        C: Serialize + ?Sized,
    {
        let body = serde_json::to_value(credentials).map_err(ApiError::encode)?;
        let request = ApiRequest::new(Method::POST, &self.inner.login_endpoint).body(body);
        let data = self.inner.execute(request).await?;

        let token = data
            .get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::Rejected {
                message: "login response carries no token".to_string(),
            })?;
        let user = data.get("user").cloned().unwrap_or(Value::Null);

        self.clear_cache();
        if let Some(session) = &self.inner.session {
            session.store(token, user.clone());
        } else {
            warn!("login succeeded but no session store is configured");
        }
        info!("logged in");
        Ok(user)
    }

    /// Ends the session and forgets everything fetched with it.
    pub fn logout(&self) {
        if let Some(session) = &self.inner.session {
            session.clear();
        }
        self.clear_cache();
        info!("logged out");
    }

    /// Drops the cached read of `path` with `params`.
    ///
    /// The next read of it reaches the backend.
    pub fn invalidate(&self, path: &str, params: &Params) -> bool {
        let key = RequestKey::new(Method::GET, path, params);
        self.inner.locks.forget(&key);
        self.inner.cache.invalidate(&key)
    }

    /// Drops every cached read of `resource` and of the resources related to it.
    pub fn invalidate_resource(&self, resource: &str) -> usize {
        self.inner
            .invalidation
            .apply(&self.inner.cache, &self.inner.locks, resource)
            .1
    }

    /// Drops every cached read and request lock.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        self.inner.locks.clear();
    }

    /// Subscribes to refresh events published after mutations.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.inner.events.subscribe()
    }

    /// The response cache.
    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    /// The single-flight lock table.
    pub fn locks(&self) -> &RequestLockManager {
        &self.inner.locks
    }

    /// The concurrency gate.
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.inner.gate
    }

    /// The event bus.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    session: Option<Arc<dyn SessionStore>>,
    events: Option<EventBus>,
    cleanup: bool,
}

impl ApiClientBuilder {
    fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: ClientConfig::default(),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            session: None,
            events: None,
            cleanup: true,
        }
    }

    /// Sets the configuration.
    ///
    /// # Default
    ///
    /// [`ClientConfig::default`]
    pub fn config(self, config: ClientConfig) -> Self {
        Self { config, ..self }
    }

    /// Sets the clock used by the cache.
    ///
    /// # Default
    ///
    /// [`SystemClock`]
    pub fn clock(self, clock: Arc<dyn Clock>) -> Self {
        Self { clock, ..self }
    }

    /// Sets how the retry loop waits between attempts.
    ///
    /// # Default
    ///
    /// [`TokioSleeper`]
    pub fn sleeper(self, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper, ..self }
    }

    /// Sets the session store written by [`ApiClient::login`] and cleared by
    /// [`ApiClient::logout`]. Share it with the transport's auth layer.
    pub fn session(self, session: Arc<dyn SessionStore>) -> Self {
        Self {
            session: Some(session),
            ..self
        }
    }

    /// Publishes refresh events on an existing bus.
    pub fn events(self, events: EventBus) -> Self {
        Self {
            events: Some(events),
            ..self
        }
    }

    /// Enables or disables the background cache sweep.
    ///
    /// # Default
    ///
    /// Enabled when built inside a Tokio runtime.
    pub fn cleanup(self, cleanup: bool) -> Self {
        Self { cleanup, ..self }
    }

    /// Builds the client.
    pub fn build(self) -> ApiClient {
        let config = self.config;
        let cache = ResponseCache::builder()
            .clock(self.clock)
            .default_ttl(config.cache.default_ttl)
            .label("responses")
            .build();

        let interval = config.cache.cleanup_interval;
        let cleanup = (self.cleanup
            && !interval.is_zero()
            && tokio::runtime::Handle::try_current().is_ok())
        .then(|| cache.spawn_cleanup(interval));

        debug!(
            base_url = %config.base_url,
            max_concurrent = config.max_concurrent(),
            timeout_ms = config.timeout.as_millis() as u64,
            "api client configured"
        );

        ApiClient {
            inner: Arc::new(ClientInner {
                transport: self.transport,
                cache,
                locks: RequestLockManager::new(&config.lock),
                gate: ConcurrencyGate::new(config.max_concurrent()),
                retry: RetryPolicy::from_config(&config.retry),
                sleeper: self.sleeper,
                timeout: config.timeout,
                invalidation: InvalidationRules::from_map(&config.invalidation),
                events: self.events.unwrap_or_default(),
                session: self.session,
                login_endpoint: SmolStr::new(&config.login_endpoint),
                ttl: config.cache,
                _cleanup: cleanup,
            }),
        }
    }
}
