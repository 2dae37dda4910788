//! The [`Transport`] seam between the coordination layer and an HTTP client.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::request::{ApiRequest, ApiResponse};

/// Sends a single request attempt to the backend.
///
/// A transport performs exactly one HTTP exchange per call and returns the raw
/// response for any status code. Retrying, gating, timeouts and envelope
/// unwrapping are done by the caller. Connection-level failures are reported as
/// [`ApiError::Transport`].
///
/// # Examples
///
/// ```rust,ignore
/// use manjaka_core::{ApiError, ApiRequest, ApiResponse, StatusCode, Transport};
///
/// struct Fixed(&'static str);
///
/// #[async_trait::async_trait]
/// impl Transport for Fixed {
///     async fn send(&self, _request: ApiRequest) -> Result<ApiResponse, ApiError> {
///         Ok(ApiResponse::new(StatusCode::OK, self.0))
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one request attempt.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.as_ref().send(request).await
    }
}

#[async_trait]
impl<T> Transport for Box<T>
where
    T: Transport + ?Sized,
{
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.as_ref().send(request).await
    }
}
