//! # manjaka-reqwest
//!
//! HTTP transport for the Maria Manjaka API client, built on
//! [reqwest-middleware](reqwest_middleware).
//!
//! [`HttpTransport`] turns [`ApiRequest`](manjaka_core::ApiRequest)s into HTTP
//! calls. When given a [`SessionGuard`] it stacks two middlewares:
//!
//! - [`AuthMiddleware`] adds the bearer token of the current session
//! - [`SessionMiddleware`] clears the session and sends the user to the login
//!   page when the backend answers 401
//!
//! [`connect`] wires everything into a ready [`ApiClient`].
//!
//! ## Feature Flags
//!
//! - `default-tls` - Enables reqwest's default TLS backend for `https` base URLs

use std::sync::Arc;

use manjaka::{ApiClient, ClientConfig};
use manjaka_core::{Navigator, SessionGuard, SessionStore};

mod middleware;
mod transport;

pub use middleware::{AuthMiddleware, SessionMiddleware};
pub use transport::{HttpTransport, HttpTransportBuilder};

/// Builds an [`ApiClient`] talking HTTP to `config.base_url`.
///
/// `session` is shared between the auth middlewares and the client, so that
/// [`ApiClient::login`] and [`ApiClient::logout`] are immediately reflected in
/// outgoing requests.
pub fn connect(
    config: ClientConfig,
    session: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
) -> ApiClient {
    let guard = SessionGuard::new(session.clone(), navigator, config.login_path.as_str());
    let transport = HttpTransport::builder(config.base_url.clone())
        .session(guard)
        .build();
    ApiClient::builder(transport)
        .config(config)
        .session(session)
        .build()
}
