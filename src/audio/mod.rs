//! # Audio Transcoding Module
//!
//! Pure audio format conversion between the telephony wire formats and the
//! backend's fixed stream format.
//!
//! ## Key Components:
//! - **mulaw**: G.711 mu-law companding (8-bit logarithmic <-> linear 16-bit)
//! - **transcode**: full frame conversion (expand/compress, byte order,
//!   linear-interpolation resampling)
//!
//! ## Backend Format (fixed):
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers
//!
//! Everything here is a total function over byte buffers: no I/O, no shared
//! state, empty input produces empty output.

pub mod mulaw;     // G.711 mu-law expand/compress
pub mod transcode; // Frame conversion between wire formats
