//! # Telephony Message Codec
//!
//! Parses and produces the JSON envelope used on the telephony WebSocket.
//! Provider variants disagree on where fields live (top level vs nested under
//! `data`) and on key names (`type` vs `event`), so every logical field is
//! looked up through an explicit ordered list of candidate paths. The first
//! present value wins; the order below is the wire-format contract.
//!
//! ## Decode Contract:
//! Parse failures are never fatal. Malformed JSON, missing payloads and
//! unrecognized event types all yield `Ignored` — a live call must survive
//! any garbage a provider sends between valid audio frames.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use tracing::debug;

/// One decoded telephony event.
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyEvent {
    /// First event of a call: carries the negotiated audio parameters.
    Start(StartParams),
    /// One frame of caller audio, already base64-decoded.
    Audio(Vec<u8>),
    /// Terminal event: the provider is ending the stream.
    Stop,
    /// Anything to skip: malformed input, interrupt/clear no-ops,
    /// unrecognized event types.
    Ignored,
}

/// Negotiation fields from a start event. All optional on the wire;
/// the session applies configured defaults for whatever is missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartParams {
    pub encoding: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Candidate paths for the audio payload, in priority order.
const AUDIO_PAYLOAD_PATHS: &[&[&str]] = &[&["data", "audio_b64"], &["audio_b64"], &["payload"]];

/// Decode one text frame from the telephony socket.
pub fn decode(raw: &str) -> TelephonyEvent {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "Ignoring unparseable telephony frame");
            return TelephonyEvent::Ignored;
        }
    };

    // Newer variants use "type", older ones "event"
    let event_type = lookup(&value, &[&["type"], &["event"]])
        .and_then(Value::as_str)
        .unwrap_or("");

    match event_type {
        "start" => TelephonyEvent::Start(decode_start(&value)),
        "audio" | "media" => decode_audio(&value),
        "stop" | "stream.stop" => TelephonyEvent::Stop,
        // Accepted but deliberately not forwarded anywhere
        "interrupt" | "clear" => TelephonyEvent::Ignored,
        other => {
            debug!(event_type = other, "Ignoring unrecognized telephony event");
            TelephonyEvent::Ignored
        }
    }
}

/// Produce the outbound audio envelope for the telephony side.
pub fn encode_audio(payload: &[u8], chunk_id: u64) -> String {
    json!({
        "type": "audio",
        "audio_b64": BASE64.encode(payload),
        "chunk_id": chunk_id,
    })
    .to_string()
}

fn decode_start(value: &Value) -> StartParams {
    // Top-level first (newer variants), nested under "data" second
    StartParams {
        encoding: lookup(value, &[&["encoding"], &["data", "encoding"]])
            .and_then(Value::as_str)
            .map(str::to_string),
        sample_rate: lookup(value, &[&["sample_rate"], &["data", "sample_rate"]])
            .and_then(Value::as_u64)
            .map(|rate| rate as u32),
        channels: lookup(value, &[&["channels"], &["data", "channels"]])
            .and_then(Value::as_u64)
            .map(|channels| channels as u16),
    }
}

fn decode_audio(value: &Value) -> TelephonyEvent {
    let encoded = match lookup(value, AUDIO_PAYLOAD_PATHS).and_then(Value::as_str) {
        Some(encoded) => encoded,
        None => {
            debug!("Ignoring audio event with no payload field");
            return TelephonyEvent::Ignored;
        }
    };

    match BASE64.decode(encoded) {
        Ok(bytes) => TelephonyEvent::Audio(bytes),
        Err(err) => {
            debug!(error = %err, "Ignoring audio event with undecodable payload");
            TelephonyEvent::Ignored
        }
    }
}

/// Return the first value present under any of the candidate paths.
fn lookup<'a>(value: &'a Value, paths: &[&[&str]]) -> Option<&'a Value> {
    for path in paths {
        let mut current = value;
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
            return Some(current);
        }
    }
    None
}
