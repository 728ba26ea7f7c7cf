//! # Remote Call Initiator
//!
//! One-shot REST exchange with the voice-AI backend: create a call bound to
//! the configured assistant and extract the WebSocket address the backend
//! wants audio streamed to. The bridge dials that address immediately after;
//! nothing from the creation response is kept beyond the URL.

use crate::audio::transcode::BACKEND_SAMPLE_RATE;
use crate::config::BackendConfig;
use crate::error::BridgeError;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Create a backend call and return its stream URL.
///
/// ## Request Contract:
/// POST {api_base_url}/call with a bearer token, asking for a raw PCM
/// WebSocket transport at the backend's fixed sample rate. Any non-success
/// status is a negotiation failure carrying the response body for diagnosis.
pub async fn create_call(config: &BackendConfig) -> Result<String, BridgeError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()?;

    let body = call_request_body(&config.assistant_id);
    debug!(url = %format!("{}/call", config.api_base_url), "Creating backend call");

    let response = client
        .post(format!("{}/call", config.api_base_url))
        .bearer_auth(&config.api_key)
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BridgeError::RemoteCallCreation {
            status: status.as_u16(),
            body,
        });
    }

    let payload: Value = response.json().await?;
    let url = stream_url_from_response(&payload).ok_or(BridgeError::MissingStreamUrl)?;

    info!(stream_url = %url, "Backend call created");
    Ok(url)
}

/// Body of the call-creation request.
fn call_request_body(assistant_id: &str) -> Value {
    json!({
        "assistantId": assistant_id,
        "transport": {
            "provider": "vapi.websocket",
            "audioFormat": {
                "format": "pcm_s16le",
                "container": "raw",
                "sampleRate": BACKEND_SAMPLE_RATE,
            },
        },
    })
}

/// Locate the stream URL in the creation response.
///
/// Checked in priority order; backend API revisions have moved this field
/// between the transport object and the top level.
fn stream_url_from_response(payload: &Value) -> Option<String> {
    const CANDIDATES: &[&[&str]] = &[
        &["transport", "websocketCallUrl"],
        &["websocketCallUrl"],
        &["transport", "callUrl"],
        &["callUrl"],
    ];

    for path in CANDIDATES {
        let mut current = payload;
        let mut found = true;
        for key in *path {
            match current.get(key) {
                Some(next) => current = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            if let Some(url) = current.as_str() {
                return Some(url.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::codec::StartParams;
    use crate::bridge::session::{CallSession, CallState, NegotiatedFormat};
    use crate::config::AppConfig;
    use actix_web::{web, App, HttpResponse, HttpServer};

    fn stub_config(base_url: String) -> BackendConfig {
        BackendConfig {
            api_base_url: base_url,
            api_key: "test-key".to_string(),
            assistant_id: "asst_test".to_string(),
            request_timeout_secs: 5,
        }
    }

    /// Spin up a one-route HTTP stub and return its base URL plus a handle
    /// to stop it.
    fn start_stub<F, R>(handler: F) -> (String, actix_web::dev::ServerHandle)
    where
        F: Fn() -> R + Clone + Send + 'static,
        R: std::future::Future<Output = HttpResponse> + 'static,
    {
        let server = HttpServer::new(move || {
            App::new().route("/call", web::post().to(handler.clone()))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        tokio::spawn(server);

        (format!("http://{}", addr), handle)
    }

    #[actix_web::test]
    async fn test_rejected_call_creation_collapses_session() {
        let (base_url, server) = start_stub(|| async {
            HttpResponse::InternalServerError().body("upstream exploded")
        });

        let err = create_call(&stub_config(base_url)).await.unwrap_err();
        match err {
            BridgeError::RemoteCallCreation { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("upstream exploded"));
            }
            other => panic!("expected RemoteCallCreation, got {}", other),
        }

        // The owning session tears down without a backend socket ever opening
        let defaults = AppConfig::default().audio;
        let session = CallSession::new(&defaults);
        session
            .begin_negotiation(NegotiatedFormat::resolve(&StartParams::default(), &defaults))
            .unwrap();
        assert!(session.begin_close(true));
        assert!(session.mark_streaming().is_err());
        session.finish_close();
        assert_eq!(session.state(), CallState::Closed);
        assert!(session.has_failed());

        server.stop(true).await;
    }

    #[actix_web::test]
    async fn test_successful_call_creation_returns_stream_url() {
        let (base_url, server) = start_stub(|| async {
            HttpResponse::Ok().json(serde_json::json!({
                "id": "call_1",
                "transport": { "websocketCallUrl": "wss://stream.example/call_1" }
            }))
        });

        let url = create_call(&stub_config(base_url)).await.unwrap();
        assert_eq!(url, "wss://stream.example/call_1");

        server.stop(true).await;
    }

    #[test]
    fn test_request_body_shape() {
        let body = call_request_body("asst_123");
        assert_eq!(body["assistantId"], "asst_123");
        assert_eq!(body["transport"]["provider"], "vapi.websocket");
        assert_eq!(body["transport"]["audioFormat"]["format"], "pcm_s16le");
        assert_eq!(body["transport"]["audioFormat"]["container"], "raw");
        assert_eq!(body["transport"]["audioFormat"]["sampleRate"], 16_000);
    }

    #[test]
    fn test_stream_url_priority() {
        let payload = json!({
            "callUrl": "wss://d",
            "websocketCallUrl": "wss://b",
            "transport": {
                "websocketCallUrl": "wss://a",
                "callUrl": "wss://c",
            },
        });
        assert_eq!(stream_url_from_response(&payload).as_deref(), Some("wss://a"));

        let payload = json!({"callUrl": "wss://d", "websocketCallUrl": "wss://b"});
        assert_eq!(stream_url_from_response(&payload).as_deref(), Some("wss://b"));

        let payload = json!({"transport": {"callUrl": "wss://c"}});
        assert_eq!(stream_url_from_response(&payload).as_deref(), Some("wss://c"));

        let payload = json!({"callUrl": "wss://d"});
        assert_eq!(stream_url_from_response(&payload).as_deref(), Some("wss://d"));
    }

    #[test]
    fn test_missing_or_non_string_url() {
        assert_eq!(stream_url_from_response(&json!({"id": "call_1"})), None);
        assert_eq!(
            stream_url_from_response(&json!({"websocketCallUrl": 42})),
            None
        );
    }
}
