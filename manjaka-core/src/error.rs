//! Error type for API calls.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use crate::envelope::error_message;
use crate::request::ApiResponse;

/// Error returned by every API call.
///
/// `ApiError` is [`Clone`]: a single failed call is shared with every caller
/// waiting on the same in-flight request, so sources are held behind [`Arc`].
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The backend answered with a non-success status (other than 401).
    #[error("request failed with status {status}: {message}")]
    Status {
        /// Response status.
        status: StatusCode,
        /// Message from the error body, or the canonical status reason.
        message: String,
        /// Cooldown requested through `Retry-After`.
        retry_after: Option<Duration>,
    },

    /// The backend rejected the session token (HTTP 401).
    #[error("session expired: {message}")]
    Unauthorized {
        /// Message from the error body.
        message: String,
    },

    /// The backend answered 2xx with `success: false`.
    #[error("{message}")]
    Rejected {
        /// Message from the envelope.
        message: String,
    },

    /// A single attempt exceeded the transport timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection-level failure (DNS, refused, reset, TLS).
    #[error("transport error: {0}")]
    Transport(#[source] Arc<dyn StdError + Send + Sync>),

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(#[source] Arc<serde_json::Error>),

    /// The request body could not be encoded.
    #[error("failed to encode request body: {0}")]
    Encode(#[source] Arc<serde_json::Error>),

    /// The task driving a shared request was cancelled or panicked.
    #[error("request task aborted")]
    Aborted,
}

impl ApiError {
    /// Wraps a connection-level error.
    pub fn transport<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Transport(Arc::new(error))
    }

    /// Wraps a response decoding error.
    pub fn decode(error: serde_json::Error) -> Self {
        Self::Decode(Arc::new(error))
    }

    /// Wraps a request encoding error.
    pub fn encode(error: serde_json::Error) -> Self {
        Self::Encode(Arc::new(error))
    }

    /// Builds the error for a non-success response.
    pub fn from_response(response: &ApiResponse) -> Self {
        let message = error_message(&response.body).unwrap_or_else(|| {
            response
                .status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });

        if response.status == StatusCode::UNAUTHORIZED {
            Self::Unauthorized { message }
        } else {
            Self::Status {
                status: response.status,
                message,
                retry_after: response.retry_after(),
            }
        }
    }

    /// HTTP status associated with the error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }

    /// Server-requested cooldown, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns `true` for HTTP 401.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Message suitable for display next to a form or in a toast.
    pub fn message(&self) -> String {
        match self {
            Self::Status { message, .. }
            | Self::Unauthorized { message }
            | Self::Rejected { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use http::header::RETRY_AFTER;

    #[test]
    fn test_from_response_uses_body_message() {
        let response = ApiResponse::new(
            StatusCode::BAD_REQUEST,
            r#"{"success":false,"message":"Numero de recu deja utilise"}"#,
        );
        let err = ApiError::from_response(&response);
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.message(), "Numero de recu deja utilise");
    }

    #[test]
    fn test_from_response_falls_back_to_reason() {
        let response = ApiResponse::new(StatusCode::BAD_GATEWAY, "<html></html>");
        assert_eq!(ApiError::from_response(&response).message(), "Bad Gateway");
    }

    #[test]
    fn test_unauthorized() {
        let response = ApiResponse::new(StatusCode::UNAUTHORIZED, r#"{"message":"Token invalide"}"#);
        let err = ApiError::from_response(&response);
        assert!(err.is_unauthorized());
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_retry_after_carried() {
        let mut response = ApiResponse::new(StatusCode::TOO_MANY_REQUESTS, "");
        response
            .headers
            .insert(RETRY_AFTER, HeaderValue::from_static("3"));
        let err = ApiError::from_response(&response);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }
}
