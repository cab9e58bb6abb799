//! Error handling for the backend module

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body Flask returns with `jsonify({"error": ...})`.
#[derive(Debug, Serialize, Deserialize)]
struct RawError {
    error: String,
}

/// Transport failures: the network, the HTTP status, or the response body.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Reqwest error, typically related to network issues or request timeouts.
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("HTTP error with status {status}: {message}")]
    Http { status: u16, message: String },

    /// The response body was not the JSON we expected.
    #[error("Decoding error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl BackendError {
    pub async fn from_response(response: reqwest::Response) -> BackendError {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response text".to_string());

        BackendError::Http { status, message }
    }

    /// The backend's own error message, when the body carries one.
    pub fn to_pretty(&self) -> Option<String> {
        match self {
            Self::Http { message: msg, .. } => serde_json::from_str::<RawError>(msg)
                .ok()
                .map(|parsed| parsed.error),
            _ => None,
        }
    }

    /// HTTP status, if the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Reqwest(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_extracts_flask_error() {
        let err = BackendError::Http {
            status: 400,
            message: r#"{"error": "No file part"}"#.to_string(),
        };
        assert_eq!(err.to_pretty().as_deref(), Some("No file part"));
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_pretty_ignores_plain_text() {
        let err = BackendError::Http {
            status: 500,
            message: "Internal Server Error".to_string(),
        };
        assert!(err.to_pretty().is_none());
    }

    #[test]
    fn test_decode_error_has_no_status() {
        let err = BackendError::from(serde_json::from_str::<RawError>("nope").unwrap_err());
        assert!(err.status().is_none());
        assert!(err.to_string().starts_with("Decoding error"));
    }
}
