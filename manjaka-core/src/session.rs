//! Authentication session and runtime navigation seams.
//!
//! The client never reaches for ambient browser state. Instead the host
//! application supplies:
//!
//! - a [`SessionStore`] holding the auth token and the serialized user profile
//! - a [`Navigator`] able to report the current location and redirect
//!
//! [`SessionGuard`] combines both to implement the 401 teardown rule: clear the
//! session, then redirect to the login entry point unless already there.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use smol_str::SmolStr;
use tracing::{debug, warn};

/// Storage for the authenticated session.
pub trait SessionStore: Send + Sync {
    /// Opaque bearer token, if logged in.
    fn token(&self) -> Option<String>;

    /// Serialized user profile, if logged in.
    fn user(&self) -> Option<Value>;

    /// Persists a fresh session after login.
    fn store(&self, token: String, user: Value);

    /// Drops the session (logout or 401).
    fn clear(&self);
}

#[derive(Debug, Default)]
struct SessionData {
    token: Option<String>,
    user: Option<Value>,
}

/// Process-local [`SessionStore`].
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    data: RwLock<SessionData>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding a session.
    pub fn with_session(token: impl Into<String>, user: Value) -> Self {
        Self {
            data: RwLock::new(SessionData {
                token: Some(token.into()),
                user: Some(user),
            }),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn token(&self) -> Option<String> {
        self.data
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .token
            .clone()
    }

    fn user(&self) -> Option<Value> {
        self.data
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .user
            .clone()
    }

    fn store(&self, token: String, user: Value) {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        data.token = Some(token);
        data.user = Some(user);
    }

    fn clear(&self) {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        data.token = None;
        data.user = None;
    }
}

/// Runtime navigation capability supplied by the host application.
pub trait Navigator: Send + Sync {
    /// Path the user is currently on, e.g. `/dashboard`.
    fn current_location(&self) -> String;

    /// Sends the user to `location`.
    fn redirect(&self, location: &str);
}

/// Navigator for headless hosts (CLI, tests, background jobs).
///
/// Reports `/` as the location and ignores redirects.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn current_location(&self) -> String {
        "/".to_string()
    }

    fn redirect(&self, _location: &str) {}
}

/// Outcome of a session teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// The session was cleared and the user sent to the login page.
    Redirected,
    /// The session was cleared; the user was already on the login page.
    AlreadyOnLogin,
}

/// Reads the bearer token and tears the session down on 401.
#[derive(Clone)]
pub struct SessionGuard {
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    login_path: SmolStr,
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("login_path", &self.login_path)
            .finish_non_exhaustive()
    }
}

impl SessionGuard {
    /// Creates a guard over `store` and `navigator`.
    pub fn new(
        store: Arc<dyn SessionStore>,
        navigator: Arc<dyn Navigator>,
        login_path: impl Into<SmolStr>,
    ) -> Self {
        Self {
            store,
            navigator,
            login_path: login_path.into(),
        }
    }

    /// Value for the `Authorization` header, if a token is stored.
    pub fn bearer(&self) -> Option<String> {
        self.store
            .token()
            .filter(|token| !token.is_empty())
            .map(|token| format!("Bearer {}", token))
    }

    /// The underlying session store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Login entry point.
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Clears the session and redirects to login unless already there.
    pub fn teardown(&self) -> Teardown {
        self.store.clear();

        let location = self.navigator.current_location();
        if location.starts_with(self.login_path.as_str()) {
            debug!(%location, "Session cleared while on login page, not redirecting");
            Teardown::AlreadyOnLogin
        } else {
            warn!(%location, login = %self.login_path, "Session rejected, redirecting to login");
            self.navigator.redirect(&self.login_path);
            Teardown::Redirected
        }
    }
}
