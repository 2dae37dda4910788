//! [`Transport`] implementation over reqwest-middleware.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use manjaka_core::{ApiError, ApiRequest, ApiResponse, SessionGuard, Transport};
use reqwest::{Client, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use tracing::trace;

use crate::middleware::{AuthMiddleware, SessionMiddleware};

/// Sends [`ApiRequest`]s to the backend over HTTP.
///
/// Request paths are appended to the base URL, so a base of
/// `https://finance.example.org/api` and a path of `/comptes` target
/// `https://finance.example.org/api/comptes`.
#[derive(Clone)]
pub struct HttpTransport {
    client: ClientWithMiddleware,
    base_url: String,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Starts building a transport for `base_url`.
    pub fn builder(base_url: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder {
            base_url: base_url.into(),
            client: None,
            session: None,
        }
    }

    /// Wraps an already assembled middleware client.
    pub fn from_client(client: ClientWithMiddleware, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, request: &ApiRequest) -> Result<Url, ApiError> {
        let mut url = Url::parse(&format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            request.path
        ))
        .map_err(ApiError::transport)?;

        if !request.params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (name, value) in request.params.iter() {
                query.append_pair(name, value);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.url(&request)?;
        trace!(method = %request.method, %url, "sending request");

        let mut builder = self
            .client
            .request(request.method, url)
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(body) = &request.body {
            let payload = serde_json::to_vec(body).map_err(ApiError::encode)?;
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(payload);
        }

        let response = builder.send().await.map_err(ApiError::transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body: Bytes = response.bytes().await.map_err(ApiError::transport)?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

/// Builder for [`HttpTransport`].
#[derive(Debug)]
pub struct HttpTransportBuilder {
    base_url: String,
    client: Option<Client>,
    session: Option<SessionGuard>,
}

impl HttpTransportBuilder {
    /// Uses a preconfigured reqwest client.
    ///
    /// # Default
    ///
    /// `reqwest::Client::new()`
    pub fn client(self, client: Client) -> Self {
        Self {
            client: Some(client),
            ..self
        }
    }

    /// Injects bearer tokens from, and tears down on 401 through, `guard`.
    ///
    /// # Default
    ///
    /// No session handling.
    pub fn session(self, guard: SessionGuard) -> Self {
        Self {
            session: Some(guard),
            ..self
        }
    }

    /// Builds the transport.
    pub fn build(self) -> HttpTransport {
        let mut builder = ClientBuilder::new(self.client.unwrap_or_default());
        if let Some(guard) = self.session {
            builder = builder
                .with(AuthMiddleware::new(guard.clone()))
                .with(SessionMiddleware::new(guard));
        }
        HttpTransport::from_client(builder.build(), self.base_url)
    }
}
