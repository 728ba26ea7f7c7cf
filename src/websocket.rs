//! # Telephony WebSocket Handler
//!
//! Accepts the telephony provider's media connection on `/media-stream` and
//! drives one call bridge per connection.
//!
//! ## Call Protocol:
//! 1. **Connection**: provider connects and upgrades to WebSocket
//! 2. **Start**: first JSON event carries the audio format; a backend call is
//!    created and its stream dialed
//! 3. **Audio Streaming**: audio events are transcoded and relayed both ways
//! 4. **Stop / Disconnect**: either side ending the call tears down both
//!    connections exactly once
//!
//! ## Actor Model:
//! Each connection is an independent Actix actor. The actor owns the
//! telephony socket and is its only writer; the backend socket lives behind
//! the pump tasks in the relay module and talks to the actor through mailbox
//! messages. Audio never crosses the bridge unless the session is Streaming.

use crate::bridge::relay::{self, BackendClosed, BackendLink, BackendReady, ForwardFrame};
use crate::bridge::session::{CallSession, CallState, NegotiatedFormat};
use crate::bridge::codec::{self, StartParams, TelephonyEvent};
use crate::audio::transcode;
use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

/// How often the actor pings the telephony side.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long without any traffic before the connection is considered dead.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket actor bridging one telephony connection to one backend call.
pub struct TelephonySocket {
    /// Shared application state (metrics)
    app_state: web::Data<AppState>,

    /// Configuration snapshot taken at connection time
    config: AppConfig,

    /// Per-call state shared with the backend pumps
    session: Arc<CallSession>,

    /// Live backend connection, present only while Streaming
    backend: Option<BackendLink>,

    /// Last heartbeat time
    last_heartbeat: Instant,
}

impl TelephonySocket {
    /// Create the actor for a freshly accepted connection.
    pub fn new(app_state: web::Data<AppState>) -> Self {
        let config = app_state.get_config();
        let session = Arc::new(CallSession::new(&config.audio));
        Self {
            app_state,
            config,
            session,
            backend: None,
            last_heartbeat: Instant::now(),
        }
    }

    /// Handle the start event: record the format and dial the backend.
    fn handle_start(&mut self, params: StartParams, ctx: &mut ws::WebsocketContext<Self>) {
        let format = NegotiatedFormat::resolve(&params, &self.config.audio);

        if let Err(err) = self.session.begin_negotiation(format) {
            warn!(call_id = %self.session.call_id, error = %err, "Ignoring out-of-order start event");
            return;
        }

        info!(
            call_id = %self.session.call_id,
            encoding = format.encoding.as_str(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            "Call negotiation started"
        );

        let backend_config = self.config.backend.clone();
        let session = self.session.clone();
        let addr = ctx.address();

        // Call creation and the socket dial block; run them off the actor
        tokio::spawn(async move {
            match relay::connect_backend(&backend_config, session, addr.clone()).await {
                Ok(link) => addr.do_send(BackendReady(link)),
                Err(err) => addr.do_send(BackendClosed {
                    reason: format!("backend negotiation failed: {}", err),
                    failed: true,
                }),
            }
        });
    }

    /// Handle one frame of caller audio.
    fn handle_audio(&mut self, data: Vec<u8>) {
        let state = self.session.state();
        if state != CallState::Streaming {
            // Audio before negotiation completes (or after teardown) is dropped
            debug!(
                call_id = %self.session.call_id,
                state = state.as_str(),
                "Dropping audio outside streaming state"
            );
            return;
        }

        let backend = match &self.backend {
            Some(backend) => backend,
            None => return,
        };

        let format = self.session.format();
        let frame = match transcode::to_backend(&data, format.encoding, format.sample_rate) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(
                    call_id = %self.session.call_id,
                    error = %BridgeError::Transcode(err),
                    "Dropping malformed telephony frame"
                );
                return;
            }
        };

        match backend.try_send(frame) {
            Ok(()) => self.session.record_frame_to_backend(),
            Err(TrySendError::Full(_)) => {
                // The backend socket has stalled; dropping keeps latency bounded
                warn!(call_id = %self.session.call_id, "Backend frame queue full, dropping frame");
            }
            Err(TrySendError::Closed(_)) => {
                // Writer task is gone; its BackendClosed message is in flight
                debug!(call_id = %self.session.call_id, "Backend frame queue closed");
            }
        }
    }

    /// Tear the call down exactly once.
    ///
    /// Safe to call from every exit path; only the first caller logs and acts,
    /// the rest are no-ops.
    fn shutdown(&mut self, ctx: &mut ws::WebsocketContext<Self>, reason: &str, failed: bool) {
        if self.session.begin_close(failed) {
            info!(call_id = %self.session.call_id, reason, "Closing call session");
        }

        if let Some(backend) = self.backend.take() {
            backend.abort();
        }

        ctx.close(None);
        ctx.stop();
    }
}

impl Actor for TelephonySocket {
    type Context = ws::WebsocketContext<Self>;

    /// Called when the WebSocket connection starts.
    fn started(&mut self, ctx: &mut Self::Context) {
        info!(call_id = %self.session.call_id, "Telephony connection started");
        self.app_state.session_started();

        // Heartbeat timer; a silent peer gets disconnected
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(call_id = %act.session.call_id, "Telephony heartbeat timeout");
                act.shutdown(ctx, "heartbeat timeout", true);
            } else {
                ctx.ping(b"");
            }
        });
    }

    /// Called when the WebSocket connection stops.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Disconnect without a stop event lands here with the session
        // still open; make sure teardown ran either way
        self.session.begin_close(false);
        if let Some(backend) = self.backend.take() {
            backend.abort();
        }
        self.session.finish_close();

        let (to_backend, to_telephony) = self.session.frame_counts();
        info!(
            call_id = %self.session.call_id,
            duration_secs = self.session.duration_seconds(),
            frames_to_backend = to_backend,
            frames_to_telephony = to_telephony,
            failed = self.session.has_failed(),
            "Call session ended"
        );

        self.app_state.session_finished(self.session.has_failed());
    }
}

/// Handle incoming telephony WebSocket messages.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for TelephonySocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                match codec::decode(&text) {
                    TelephonyEvent::Start(params) => self.handle_start(params, ctx),
                    TelephonyEvent::Audio(data) => self.handle_audio(data),
                    TelephonyEvent::Stop => self.shutdown(ctx, "stop event", false),
                    TelephonyEvent::Ignored => {}
                }
            }
            Ok(ws::Message::Binary(data)) => {
                // The telephony protocol is text-only JSON
                warn!(
                    call_id = %self.session.call_id,
                    bytes = data.len(),
                    "Ignoring unexpected binary frame from telephony side"
                );
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                debug!(call_id = %self.session.call_id, ?reason, "Telephony side closed");
                self.shutdown(ctx, "telephony close frame", false);
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(call_id = %self.session.call_id, error = %err, "Telephony protocol error");
                self.shutdown(ctx, "telephony protocol error", true);
            }
        }
    }
}

/// Backend connected: start streaming, unless teardown won the race.
impl Handler<BackendReady> for TelephonySocket {
    type Result = ();

    fn handle(&mut self, msg: BackendReady, ctx: &mut Self::Context) {
        match self.session.mark_streaming() {
            Ok(()) => {
                info!(call_id = %self.session.call_id, "Call bridged, audio flowing");
                self.backend = Some(msg.0);
            }
            Err(err) => {
                // Caller hung up while the backend call was being created
                debug!(call_id = %self.session.call_id, error = %err, "Backend ready after teardown");
                msg.0.abort();
                self.shutdown(ctx, "backend ready after teardown", false);
            }
        }
    }
}

/// One envelope from the backend reader, ready for the telephony side.
impl Handler<ForwardFrame> for TelephonySocket {
    type Result = ();

    fn handle(&mut self, msg: ForwardFrame, ctx: &mut Self::Context) {
        if self.session.state() == CallState::Streaming {
            ctx.text(msg.0);
        }
    }
}

/// Backend connection ended: the call is over.
impl Handler<BackendClosed> for TelephonySocket {
    type Result = ();

    fn handle(&mut self, msg: BackendClosed, ctx: &mut Self::Context) {
        if msg.failed {
            error!(call_id = %self.session.call_id, reason = %msg.reason, "Backend connection failed");
        } else {
            info!(call_id = %self.session.call_id, reason = %msg.reason, "Backend connection closed");
        }
        self.shutdown(ctx, &msg.reason, msg.failed);
    }
}

/// WebSocket endpoint handler for `/media-stream`.
///
/// ## HTTP to WebSocket Upgrade:
/// Handles the initial HTTP request and upgrades it to a WebSocket
/// connection; everything after that is the TelephonySocket actor.
pub async fn media_stream(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        peer = ?req.connection_info().peer_addr(),
        "New telephony media connection"
    );

    ws::start(TelephonySocket::new(app_state), &req, stream)
}
