//! # Error Handling
//!
//! This module defines the two error types of the service and how they are
//! surfaced.
//!
//! ## Error Categories:
//! - **AppError**: failures on the HTTP surface, converted into JSON error
//!   responses by actix via the ResponseError trait. Constructed by the JSON
//!   body error handler; handlers themselves return it where they can fail.
//! - **BridgeError**: session-fatal failures inside a call bridge
//!   (negotiation, transport, transcoding). These never become HTTP
//!   responses; they collapse the owning session into its Closing state and
//!   are logged with the session context.
//!
//! Parse-level problems (malformed telephony JSON, undecodable base64) are
//! deliberately NOT errors: the codec recovers locally by ignoring the
//! message, so no type here represents them.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Errors returned on the HTTP surface.
#[derive(Debug)]
pub enum AppError {
    /// Client sent invalid or malformed data
    BadRequest(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
        }
    }
}

/// Converts AppError values into JSON HTTP responses.
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Session-fatal failures inside a call bridge.
///
/// Any of these moves the session to Closing: both connections are released
/// and no retry is attempted within the call. The variants mirror the failure
/// taxonomy of the bridge:
/// - **RemoteCallCreation**: the backend rejected the call-creation request;
///   carries the response body for diagnosis.
/// - **MissingStreamUrl**: call creation succeeded but no usable stream
///   address was found under any known response field.
/// - **Transport**: socket read/write/connect failure on either side.
/// - **Transcode**: malformed audio buffer (e.g. odd-length 16-bit PCM).
///   Callers treat this as a dropped frame, not a session failure, but it is
///   represented here so failures log with one vocabulary.
#[derive(Debug)]
pub enum BridgeError {
    RemoteCallCreation { status: u16, body: String },
    MissingStreamUrl,
    Transport(String),
    Transcode(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::RemoteCallCreation { status, body } => {
                write!(f, "Remote call creation failed with status {}: {}", status, body)
            }
            BridgeError::MissingStreamUrl => {
                write!(f, "Remote call creation returned no stream URL")
            }
            BridgeError::Transport(msg) => write!(f, "Transport error: {}", msg),
            BridgeError::Transcode(msg) => write!(f, "Transcode error: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::RemoteCallCreation {
            status: 500,
            body: "upstream exploded".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("500"));
        assert!(text.contains("upstream exploded"));

        assert!(BridgeError::MissingStreamUrl.to_string().contains("no stream URL"));

        let err = BridgeError::Transcode("PCM buffer length must be even".to_string());
        assert!(err.to_string().starts_with("Transcode error:"));
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::BadRequest("missing field".to_string());
        assert_eq!(err.to_string(), "Bad request: missing field");
    }

    #[test]
    fn test_bad_request_maps_to_400() {
        let response = AppError::BadRequest("missing field".to_string()).error_response();
        assert_eq!(response.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }
}
