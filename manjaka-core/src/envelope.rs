//! The backend's response envelope.
//!
//! Every backend reply is wrapped as `{ "success": bool, "message": string, "data": T }`.
//! Callers and the cache only ever see the unwrapped `data`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

fn default_success() -> bool {
    true
}

/// Backend response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    /// Whether the backend considers the operation successful.
    #[serde(default = "default_success")]
    pub success: bool,
    /// Human-readable message, possibly empty.
    #[serde(default)]
    pub message: String,
    /// Payload.
    #[serde(default)]
    pub data: T,
}

impl Envelope<Value> {
    /// Decodes an envelope from raw bytes.
    ///
    /// An empty body decodes to a successful envelope with `null` data.
    pub fn from_slice(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self {
                success: true,
                message: String::new(),
                data: Value::Null,
            });
        }
        serde_json::from_slice(body).map_err(ApiError::decode)
    }

    /// Unwraps the payload, turning `success: false` into [`ApiError::Rejected`].
    pub fn into_data(self) -> Result<Value, ApiError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ApiError::Rejected {
                message: self.message,
            })
        }
    }
}

/// Best-effort extraction of the `message` field from an error body.
pub(crate) fn error_message(body: &[u8]) -> Option<String> {
    #[derive(Deserialize)]
    struct MessageOnly {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
    }

    let parsed: MessageOnly = serde_json::from_slice(body).ok()?;
    parsed
        .message
        .or(parsed.error)
        .filter(|message| !message.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_unwrap_data() {
        let body = br#"{"success":true,"message":"ok","data":[{"id":1,"nom":"Caisse"}]}"#;
        let data = Envelope::from_slice(body).unwrap().into_data().unwrap();
        assert_eq!(data, json!([{"id": 1, "nom": "Caisse"}]));
    }

    #[test]
    fn test_missing_data_is_null() {
        let data = Envelope::from_slice(br#"{"success":true,"message":"supprime"}"#)
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(data, Value::Null);
    }

    #[test]
    fn test_unsuccessful_envelope_is_rejected() {
        let err = Envelope::from_slice(br#"{"success":false,"message":"Solde insuffisant"}"#)
            .unwrap()
            .into_data()
            .unwrap_err();
        assert!(matches!(err, ApiError::Rejected { ref message } if message == "Solde insuffisant"));
    }

    #[test]
    fn test_empty_body() {
        let data = Envelope::from_slice(b"").unwrap().into_data().unwrap();
        assert_eq!(data, Value::Null);
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(br#"{"success":false,"message":"Compte introuvable"}"#),
            Some("Compte introuvable".to_string())
        );
        assert_eq!(error_message(br#"{"error":"Bad token"}"#), Some("Bad token".to_string()));
        assert_eq!(error_message(b"<html>502</html>"), None);
    }
}
