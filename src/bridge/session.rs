//! # Call Session State
//!
//! One CallSession exists per telephony connection and lives exactly as long
//! as the call. It holds the lifecycle state machine, the negotiated audio
//! format, and the outbound chunk sequence.
//!
//! ## Session Lifecycle:
//! 1. **Idle**: connection accepted, no events yet
//! 2. **Negotiating**: start event received, backend call being created
//! 3. **Streaming**: backend socket open, both pumps running
//! 4. **Closing**: teardown begun (error, stop event, or disconnect)
//! 5. **Closed**: both connections released
//!
//! ## Thread Safety:
//! The session is shared between the telephony actor and the backend pump
//! tasks. Each mutable field has exactly one writer in steady state (the
//! chunk sequence belongs to the backend reader, the state to the actor), so
//! plain atomics and a small RwLock suffice. Teardown is the one cross-task
//! interaction: begin_close() is a compare-and-swap, safe to invoke from
//! either pump or from an external cancellation at the same time.

use crate::audio::transcode::AudioEncoding;
use crate::bridge::codec::StartParams;
use crate::config::AudioConfig;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

/// Current lifecycle state of a call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Connection accepted, waiting for the start event
    Idle,
    /// Start received, backend call being created
    Negotiating,
    /// Both connections live, audio flowing
    Streaming,
    /// Teardown in progress
    Closing,
    /// Both connections released
    Closed,
}

impl CallState {
    /// State name for logs and API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Negotiating => "negotiating",
            CallState::Streaming => "streaming",
            CallState::Closing => "closing",
            CallState::Closed => "closed",
        }
    }
}

/// Audio parameters settled during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
    pub channels: u16,
}

impl NegotiatedFormat {
    /// Resolve start-event fields against the configured defaults.
    ///
    /// Fields the provider omitted, and encoding labels the transcoder does
    /// not recognize, fall back to the explicit `[audio]` configuration.
    pub fn resolve(params: &StartParams, defaults: &AudioConfig) -> Self {
        let default_encoding = defaults.default_encoding();

        Self {
            encoding: params
                .encoding
                .as_deref()
                .and_then(AudioEncoding::from_label)
                .unwrap_or(default_encoding),
            sample_rate: params.sample_rate.unwrap_or(defaults.default_sample_rate),
            channels: params.channels.unwrap_or(defaults.default_channels),
        }
    }
}

/// Per-call state shared between the telephony actor and the backend pumps.
pub struct CallSession {
    /// Unique identifier for this call
    pub call_id: String,

    /// Lifecycle state (written by the actor, read everywhere)
    state: RwLock<CallState>,

    /// Negotiated format (written once during negotiation)
    format: RwLock<NegotiatedFormat>,

    /// Next outbound chunk id; mutated only by the backend reader pump
    chunk_seq: AtomicU64,

    /// First-close latch making teardown idempotent
    close_started: AtomicBool,

    /// Whether teardown was caused by a failure (vs a normal stop)
    failed: AtomicBool,

    /// Frames forwarded telephony -> backend
    frames_to_backend: AtomicU64,

    /// Frames forwarded backend -> telephony
    frames_to_telephony: AtomicU64,

    /// When the connection was accepted
    pub created_at: DateTime<Utc>,
}

impl CallSession {
    /// Create a session for a freshly accepted telephony connection.
    pub fn new(defaults: &AudioConfig) -> Self {
        let format = NegotiatedFormat::resolve(&StartParams::default(), defaults);
        Self {
            call_id: Uuid::new_v4().to_string(),
            state: RwLock::new(CallState::Idle),
            format: RwLock::new(format),
            chunk_seq: AtomicU64::new(1),
            close_started: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            frames_to_backend: AtomicU64::new(0),
            frames_to_telephony: AtomicU64::new(0),
            created_at: Utc::now(),
        }
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> CallState {
        *self.state.read().unwrap()
    }

    /// Get the negotiated audio format.
    pub fn format(&self) -> NegotiatedFormat {
        *self.format.read().unwrap()
    }

    /// Record negotiation parameters and enter Negotiating.
    ///
    /// ## State Transition:
    /// Idle -> Negotiating. A second start event, or a start after teardown
    /// has begun, is rejected.
    pub fn begin_negotiation(&self, format: NegotiatedFormat) -> Result<(), String> {
        let mut state = self.state.write().unwrap();
        match *state {
            CallState::Idle => {
                *self.format.write().unwrap() = format;
                *state = CallState::Negotiating;
                Ok(())
            }
            other => Err(format!("cannot negotiate from state {:?}", other)),
        }
    }

    /// Enter Streaming once the backend connection is established.
    ///
    /// ## State Transition:
    /// Negotiating -> Streaming. Fails if teardown won the race (e.g. the
    /// caller hung up while the backend call was being created).
    pub fn mark_streaming(&self) -> Result<(), String> {
        let mut state = self.state.write().unwrap();
        match *state {
            CallState::Negotiating => {
                *state = CallState::Streaming;
                Ok(())
            }
            other => Err(format!("cannot start streaming from state {:?}", other)),
        }
    }

    /// Begin teardown. Idempotent: returns true for exactly one caller.
    ///
    /// Both pumps and the actor may race into this; the compare-and-swap
    /// guarantees a single winner and repeated calls are silent no-ops.
    pub fn begin_close(&self, failed: bool) -> bool {
        let first = self
            .close_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();

        if first {
            if failed {
                self.failed.store(true, Ordering::SeqCst);
            }
            *self.state.write().unwrap() = CallState::Closing;
        }
        first
    }

    /// Mark both connections released.
    ///
    /// ## State Transition:
    /// Closing -> Closed (also safe if begin_close was never observed, e.g.
    /// a connection dropped before any event arrived).
    pub fn finish_close(&self) {
        *self.state.write().unwrap() = CallState::Closed;
    }

    /// Whether teardown was caused by a failure.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Claim the next outbound chunk id (1, 2, 3, ...).
    ///
    /// Only the backend reader pump calls this, so the sequence is strictly
    /// increasing by one for the session's lifetime.
    pub fn next_chunk_seq(&self) -> u64 {
        self.chunk_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Count one frame forwarded to the backend.
    pub fn record_frame_to_backend(&self) {
        self.frames_to_backend.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one frame forwarded to the telephony side.
    pub fn record_frame_to_telephony(&self) {
        self.frames_to_telephony.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames forwarded in each direction (to backend, to telephony).
    pub fn frame_counts(&self) -> (u64, u64) {
        (
            self.frames_to_backend.load(Ordering::Relaxed),
            self.frames_to_telephony.load(Ordering::Relaxed),
        )
    }

    /// Session age in seconds.
    pub fn duration_seconds(&self) -> f64 {
        let duration = Utc::now().signed_duration_since(self.created_at);
        duration.num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn defaults() -> AudioConfig {
        AppConfig::default().audio
    }

    fn mulaw_format() -> NegotiatedFormat {
        NegotiatedFormat {
            encoding: AudioEncoding::Ulaw8k,
            sample_rate: 8000,
            channels: 1,
        }
    }

    #[test]
    fn test_happy_path_lifecycle() {
        let session = CallSession::new(&defaults());
        assert_eq!(session.state(), CallState::Idle);

        session.begin_negotiation(mulaw_format()).unwrap();
        assert_eq!(session.state(), CallState::Negotiating);

        session.mark_streaming().unwrap();
        assert_eq!(session.state(), CallState::Streaming);

        assert!(session.begin_close(false));
        assert_eq!(session.state(), CallState::Closing);

        session.finish_close();
        assert_eq!(session.state(), CallState::Closed);
        assert!(!session.has_failed());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let session = CallSession::new(&defaults());

        // Streaming before negotiation
        assert!(session.mark_streaming().is_err());

        session.begin_negotiation(mulaw_format()).unwrap();
        // Duplicate start event
        assert!(session.begin_negotiation(mulaw_format()).is_err());

        // Backend came up after teardown already began
        session.begin_close(true);
        assert!(session.mark_streaming().is_err());
        assert!(session.has_failed());
    }

    #[test]
    fn test_close_is_idempotent() {
        let session = CallSession::new(&defaults());
        assert!(session.begin_close(false));
        assert!(!session.begin_close(true));
        assert!(!session.begin_close(false));
        // The losing failed=true call must not rewrite the outcome
        assert!(!session.has_failed());
        session.finish_close();
        session.finish_close();
        assert_eq!(session.state(), CallState::Closed);
    }

    #[test]
    fn test_concurrent_close_single_winner() {
        use std::sync::Arc;
        use std::thread;

        let session = Arc::new(CallSession::new(&defaults()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let session = session.clone();
            handles.push(thread::spawn(move || session.begin_close(false)));
        }

        let wins = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(session.state(), CallState::Closing);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(CallState::Idle.as_str(), "idle");
        assert_eq!(CallState::Negotiating.as_str(), "negotiating");
        assert_eq!(CallState::Streaming.as_str(), "streaming");
        assert_eq!(CallState::Closing.as_str(), "closing");
        assert_eq!(CallState::Closed.as_str(), "closed");
    }

    #[test]
    fn test_chunk_seq_starts_at_one_and_increments() {
        let session = CallSession::new(&defaults());
        assert_eq!(session.next_chunk_seq(), 1);
        assert_eq!(session.next_chunk_seq(), 2);
        assert_eq!(session.next_chunk_seq(), 3);
    }

    #[test]
    fn test_format_resolution_applies_defaults() {
        let params = StartParams {
            encoding: Some("something-unknown".to_string()),
            sample_rate: None,
            channels: None,
        };
        let format = NegotiatedFormat::resolve(&params, &defaults());
        assert_eq!(format.encoding, AudioEncoding::Ulaw8k);
        assert_eq!(format.sample_rate, 8000);
        assert_eq!(format.channels, 1);

        let params = StartParams {
            encoding: Some("audio/l16".to_string()),
            sample_rate: Some(16_000),
            channels: Some(2),
        };
        let format = NegotiatedFormat::resolve(&params, &defaults());
        assert_eq!(format.encoding, AudioEncoding::Pcm16Be);
        assert_eq!(format.sample_rate, 16_000);
        assert_eq!(format.channels, 2);
    }
}
