//! # Call Bridging Module
//!
//! Everything that happens between accepting a telephony media connection and
//! releasing both sockets at the end of the call:
//!
//! - **codec**: the JSON envelope spoken by the telephony side
//! - **session**: per-call state machine and sequence counter
//! - **initiator**: the one-shot REST exchange that creates the backend call
//! - **relay**: the backend socket pumps and their internal actor messages
//!
//! The telephony-facing WebSocket actor lives in src/websocket.rs at the root
//! level and drives these pieces.

pub mod codec;     // Telephony JSON envelope decode/encode
pub mod initiator; // Remote call creation
pub mod relay;     // Backend connection and pump tasks
pub mod session;   // Per-call lifecycle state
