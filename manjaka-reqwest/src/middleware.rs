//! Session middlewares for reqwest-middleware.

use async_trait::async_trait;
use http::Extensions;
use http::header::{AUTHORIZATION, HeaderValue};
use manjaka_core::{SessionGuard, Teardown};
use reqwest::{Request, Response, StatusCode};
use reqwest_middleware::{Middleware, Next, Result};
use tracing::{debug, warn};

/// Adds `Authorization: Bearer <token>` to every request while a session exists.
#[derive(Clone, Debug)]
pub struct AuthMiddleware {
    guard: SessionGuard,
}

impl AuthMiddleware {
    /// Creates the middleware reading tokens through `guard`.
    pub fn new(guard: SessionGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Middleware for AuthMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if let Some(bearer) = self.guard.bearer() {
            match HeaderValue::from_str(&bearer) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    req.headers_mut().insert(AUTHORIZATION, value);
                }
                Err(error) => warn!(%error, "session token is not a valid header value"),
            }
        }
        next.run(req, extensions).await
    }
}

/// Tears the session down when the backend answers 401.
///
/// The response itself is passed through unchanged so that the caller still
/// sees the rejection.
#[derive(Clone, Debug)]
pub struct SessionMiddleware {
    guard: SessionGuard,
}

impl SessionMiddleware {
    /// Creates the middleware clearing sessions through `guard`.
    pub fn new(guard: SessionGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Middleware for SessionMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let url = req.url().path().to_string();
        let response = next.run(req, extensions).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            match self.guard.teardown() {
                Teardown::Redirected => {
                    debug!(%url, login = self.guard.login_path(), "session rejected, sent to login")
                }
                Teardown::AlreadyOnLogin => debug!(%url, "session rejected on the login page"),
            }
        }
        Ok(response)
    }
}
