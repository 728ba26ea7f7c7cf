//! # Backend Relay
//!
//! Owns the WebSocket connection to the voice-AI backend and the two tasks
//! that pump it. The telephony actor never touches the backend socket
//! directly:
//!
//! - the **writer task** is the only writer to the backend sink; the actor
//!   feeds it through a bounded channel
//! - the **reader task** is the only consumer of the backend stream and the
//!   only place outbound chunk ids are claimed; decoded frames travel back to
//!   the actor as mailbox messages
//!
//! With one writer per socket direction there is nothing to lock in steady
//! state. Either task exiting (error or clean close) tells the actor via
//! `BackendClosed`, and the actor's teardown aborts whichever task is left.

use crate::audio::transcode;
use crate::bridge::codec;
use crate::bridge::initiator;
use crate::bridge::session::CallSession;
use crate::config::BackendConfig;
use crate::error::BridgeError;
use crate::websocket::TelephonySocket;
use actix::{Addr, Message};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type BackendSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type BackendStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Frames queued toward the backend before the channel pushes back.
///
/// At 20ms per frame this holds over a second of audio; a full queue means
/// the backend socket has stalled badly enough that dropping is kinder than
/// buffering without bound.
const FRAME_QUEUE_DEPTH: usize = 64;

/// Backend is connected and pumping; carried from the connect task to the
/// telephony actor.
#[derive(Message)]
#[rtype(result = "()")]
pub struct BackendReady(pub BackendLink);

/// One encoded envelope ready to send to the telephony side.
#[derive(Message)]
#[rtype(result = "()")]
pub struct ForwardFrame(pub String);

/// The backend connection is gone; the actor must tear the call down.
#[derive(Message)]
#[rtype(result = "()")]
pub struct BackendClosed {
    pub reason: String,
    /// Whether this was a failure (read/write error) or a clean goodbye
    pub failed: bool,
}

/// Handle to a live backend connection.
pub struct BackendLink {
    frames: mpsc::Sender<Vec<u8>>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl BackendLink {
    /// Queue one backend-format frame for sending.
    pub fn try_send(&self, frame: Vec<u8>) -> Result<(), mpsc::error::TrySendError<Vec<u8>>> {
        self.frames.try_send(frame)
    }

    /// Abort both pump tasks. Idempotent; aborting a finished task is a no-op.
    pub fn abort(&self) {
        self.writer.abort();
        self.reader.abort();
    }
}

/// Create the backend call, dial its stream URL and start both pumps.
///
/// The whole exchange (REST call plus socket dial) is bounded by the
/// configured request timeout so a dead backend cannot hold a session in
/// Negotiating forever.
pub async fn connect_backend(
    config: &BackendConfig,
    session: Arc<CallSession>,
    addr: Addr<TelephonySocket>,
) -> Result<BackendLink, BridgeError> {
    let stream_url = initiator::create_call(config).await?;

    let dial = connect_async(stream_url.as_str());
    let (socket, _response) =
        tokio::time::timeout(Duration::from_secs(config.request_timeout_secs), dial)
            .await
            .map_err(|_| {
                BridgeError::Transport(format!(
                    "backend socket dial timed out after {}s",
                    config.request_timeout_secs
                ))
            })??;

    info!(call_id = %session.call_id, "Backend stream connected");

    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::channel(FRAME_QUEUE_DEPTH);

    let writer = tokio::spawn(run_backend_writer(rx, sink, addr.clone()));
    let reader = tokio::spawn(run_backend_reader(stream, session, addr));

    Ok(BackendLink {
        frames: tx,
        writer,
        reader,
    })
}

/// Drain the frame channel into the backend socket.
///
/// Runs until the channel closes (actor dropped the link) or a write fails.
async fn run_backend_writer(
    mut frames: mpsc::Receiver<Vec<u8>>,
    mut sink: BackendSink,
    addr: Addr<TelephonySocket>,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(err) = sink.send(WsMessage::Binary(frame)).await {
            addr.do_send(BackendClosed {
                reason: format!("backend write failed: {}", err),
                failed: true,
            });
            return;
        }
    }

    // Channel closed: the actor is tearing down, say goodbye politely
    let _ = sink.send(WsMessage::Close(None)).await;
}

/// Pump backend frames toward the telephony actor.
///
/// This task is the sole claimer of chunk ids, so the outbound sequence is
/// strictly ordered no matter how the socket interleaves frames.
async fn run_backend_reader(
    mut stream: BackendStream,
    session: Arc<CallSession>,
    addr: Addr<TelephonySocket>,
) {
    let (reason, failed) = loop {
        match process_backend_message(stream.next().await, &session) {
            ReaderEvent::Forward(text) => addr.do_send(ForwardFrame(text)),
            ReaderEvent::Ignore => {}
            ReaderEvent::Closed { reason, failed } => break (reason, failed),
        }
    };

    addr.do_send(BackendClosed { reason, failed });
}

/// Outcome of one item from the backend stream.
enum ReaderEvent {
    /// Envelope ready for the telephony side
    Forward(String),
    /// Nothing to relay (control traffic, dropped frame, ping/pong)
    Ignore,
    /// The stream is over; the relay must stop
    Closed { reason: String, failed: bool },
}

/// Classify one backend stream item.
///
/// A chunk id is claimed only when a frame actually goes out, so the
/// outbound sequence stays gapless across dropped frames and control
/// traffic.
fn process_backend_message(
    item: Option<Result<WsMessage, tokio_tungstenite::tungstenite::Error>>,
    session: &CallSession,
) -> ReaderEvent {
    match item {
        Some(Ok(WsMessage::Binary(data))) => {
            let format = session.format();
            match transcode::from_backend(&data, format.encoding, format.sample_rate) {
                Ok(payload) => {
                    let chunk_id = session.next_chunk_seq();
                    session.record_frame_to_telephony();
                    ReaderEvent::Forward(codec::encode_audio(&payload, chunk_id))
                }
                Err(err) => {
                    // Drop the frame; the next one stands on its own
                    warn!(
                        call_id = %session.call_id,
                        error = %BridgeError::Transcode(err),
                        "Dropping malformed backend frame"
                    );
                    ReaderEvent::Ignore
                }
            }
        }
        Some(Ok(WsMessage::Text(text))) => {
            // Backend control traffic (status, transcripts); not forwarded
            debug!(call_id = %session.call_id, message = %text, "Backend control message");
            ReaderEvent::Ignore
        }
        Some(Ok(WsMessage::Close(frame))) => {
            let reason = match frame {
                Some(frame) => format!("backend closed the stream: {}", frame.reason),
                None => "backend closed the stream".to_string(),
            };
            ReaderEvent::Closed { reason, failed: false }
        }
        // Ping/pong handled by the protocol layer
        Some(Ok(_)) => ReaderEvent::Ignore,
        Some(Err(err)) => ReaderEvent::Closed {
            reason: format!("backend read failed: {}", err),
            failed: true,
        },
        None => ReaderEvent::Closed {
            reason: "backend stream ended".to_string(),
            failed: false,
        },
    }
}
