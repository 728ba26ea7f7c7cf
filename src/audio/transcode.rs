//! # Frame Transcoding
//!
//! Converts one audio frame between the telephony wire format and the
//! backend's fixed format (16-bit PCM, little-endian, 16 kHz, mono).
//!
//! ## Conversion Paths:
//! - **mu-law**: expand to linear 16-bit, resample declared rate -> 16 kHz
//! - **PCM16 big-endian**: byte-swap to little-endian, resample -> 16 kHz
//! - **PCM16 little-endian**: resample -> 16 kHz
//!
//! `from_backend` mirrors whichever branch `to_backend` took, so one call's
//! audio always round-trips through the same pair of operations.
//!
//! ## Error Handling:
//! All operations are total over well-formed buffers (empty in -> empty out).
//! An odd-length 16-bit PCM buffer cannot occur under correct sample framing;
//! it trips a debug assertion in debug builds and is reported as an error in
//! release builds so the caller can drop the frame instead of forwarding a
//! miscomputed byte-swap.

use crate::audio::mulaw;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Sample rate of the backend stream; the backend supports nothing else.
pub const BACKEND_SAMPLE_RATE: u32 = 16_000;

/// Wire encoding negotiated by the telephony start event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    /// 8-bit G.711 mu-law, 8 kHz
    Ulaw8k,
    /// 16-bit linear PCM delivered big-endian
    Pcm16Be,
    /// 16-bit linear PCM little-endian (the fallthrough default)
    Pcm16Le,
}

impl AudioEncoding {
    /// Parse the encoding label carried by a start event.
    ///
    /// Labels observed across provider variants; anything unrecognized
    /// returns None and the caller applies the configured default.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "audio/pcmu" | "pcmu" | "mulaw" | "ulaw" | "g711u" => Some(AudioEncoding::Ulaw8k),
            "audio/l16" | "l16" | "pcm16be" | "pcm_s16be" => Some(AudioEncoding::Pcm16Be),
            "audio/pcm" | "pcm" | "pcm16le" | "pcm_s16le" => Some(AudioEncoding::Pcm16Le),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioEncoding::Ulaw8k => "audio/pcmu",
            AudioEncoding::Pcm16Be => "audio/l16",
            AudioEncoding::Pcm16Le => "audio/pcm",
        }
    }
}

/// Convert a telephony-side frame to backend format (PCM16LE @ 16 kHz).
pub fn to_backend(data: &[u8], encoding: AudioEncoding, sample_rate: u32) -> Result<Vec<u8>, String> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let samples = match encoding {
        AudioEncoding::Ulaw8k => mulaw::decode_buffer(data),
        AudioEncoding::Pcm16Be => bytes_to_samples_le(&byte_swap(data)?)?,
        AudioEncoding::Pcm16Le => bytes_to_samples_le(data)?,
    };

    let resampled = resample(&samples, sample_rate, BACKEND_SAMPLE_RATE);
    Ok(samples_to_bytes_le(&resampled))
}

/// Convert a backend frame (PCM16LE @ 16 kHz) back to the telephony wire format.
pub fn from_backend(data: &[u8], encoding: AudioEncoding, sample_rate: u32) -> Result<Vec<u8>, String> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let samples = bytes_to_samples_le(data)?;
    let resampled = resample(&samples, BACKEND_SAMPLE_RATE, sample_rate);

    match encoding {
        AudioEncoding::Ulaw8k => Ok(mulaw::encode_buffer(&resampled)),
        AudioEncoding::Pcm16Be => byte_swap(&samples_to_bytes_le(&resampled)),
        AudioEncoding::Pcm16Le => Ok(samples_to_bytes_le(&resampled)),
    }
}

/// Swap the byte order of every 16-bit sample in the buffer.
///
/// Defined only for even-length buffers; 16-bit sample framing guarantees
/// that, so an odd length is a logic error upstream.
pub fn byte_swap(data: &[u8]) -> Result<Vec<u8>, String> {
    if data.len() % 2 != 0 {
        debug_assert!(data.len() % 2 == 0, "byte swap requires 16-bit sample framing");
        return Err(format!(
            "cannot byte-swap odd-length buffer ({} bytes)",
            data.len()
        ));
    }

    let mut out = vec![0u8; data.len()];
    for i in 0..data.len() / 2 {
        out[2 * i] = data[2 * i + 1];
        out[2 * i + 1] = data[2 * i];
    }
    Ok(out)
}

/// Resample 16-bit PCM by linear interpolation between neighboring samples.
///
/// ## Determinism:
/// Output length is floor(n * to / from); for the 8 kHz <-> 16 kHz pair this
/// is exact in both directions, so round-trip latency stays bounded and no
/// partial trailing sample is ever dropped silently.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if samples.is_empty() || from_rate == to_rate {
        return samples.to_vec();
    }

    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * step;
        let idx = pos as usize;
        let frac = pos - idx as f64;

        let s0 = samples[idx] as f64;
        // Hold the last sample at the buffer edge
        let s1 = if idx + 1 < samples.len() {
            samples[idx + 1] as f64
        } else {
            s0
        };

        out.push((s0 + (s1 - s0) * frac).round() as i16);
    }
    out
}

/// Parse a little-endian 16-bit PCM buffer into samples.
fn bytes_to_samples_le(data: &[u8]) -> Result<Vec<i16>, String> {
    if data.len() % 2 != 0 {
        debug_assert!(data.len() % 2 == 0, "PCM buffers carry whole 16-bit samples");
        return Err(format!(
            "PCM buffer length must be even for 16-bit samples (got {})",
            data.len()
        ));
    }

    let mut cursor = Cursor::new(data);
    let mut samples = Vec::with_capacity(data.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample);
    }
    Ok(samples)
}

/// Serialize samples as little-endian 16-bit PCM.
fn samples_to_bytes_le(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_labels() {
        assert_eq!(AudioEncoding::from_label("audio/pcmu"), Some(AudioEncoding::Ulaw8k));
        assert_eq!(AudioEncoding::from_label("PCMU"), Some(AudioEncoding::Ulaw8k));
        assert_eq!(AudioEncoding::from_label("audio/l16"), Some(AudioEncoding::Pcm16Be));
        assert_eq!(AudioEncoding::from_label("pcm_s16le"), Some(AudioEncoding::Pcm16Le));
        assert_eq!(AudioEncoding::from_label("audio/opus"), None);
    }

    #[test]
    fn test_byte_swap_involution() {
        let data: Vec<u8> = (0u8..32).collect();
        let swapped = byte_swap(&data).unwrap();
        assert_ne!(swapped, data);
        assert_eq!(byte_swap(&swapped).unwrap(), data);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_byte_swap_rejects_odd_length() {
        assert!(byte_swap(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_resample_doubles_and_halves() {
        let samples: Vec<i16> = (0..160).map(|i| (i * 100) as i16).collect();

        let up = resample(&samples, 8000, 16_000);
        assert_eq!(up.len(), 320);

        let down = resample(&up, 16_000, 8000);
        assert_eq!(down.len(), samples.len());

        assert!(resample(&[], 8000, 16_000).is_empty());
        assert_eq!(resample(&samples, 8000, 8000), samples);
    }

    #[test]
    fn test_resample_preserves_constant_signal() {
        let samples = vec![1000i16; 80];
        for s in resample(&samples, 8000, 16_000) {
            assert_eq!(s, 1000);
        }
    }

    #[test]
    fn test_empty_input_both_directions() {
        for encoding in [AudioEncoding::Ulaw8k, AudioEncoding::Pcm16Be, AudioEncoding::Pcm16Le] {
            assert!(to_backend(&[], encoding, 8000).unwrap().is_empty());
            assert!(from_backend(&[], encoding, 8000).unwrap().is_empty());
        }
    }

    #[test]
    fn test_mulaw_silence_frame() {
        // 20ms of mu-law silence at 8 kHz: 160 bytes of 0xFF. The backend
        // frame must be 16-bit PCM at 16 kHz: 320 samples, 640 zero bytes.
        let frame = vec![0xFFu8; 160];
        let pcm = to_backend(&frame, AudioEncoding::Ulaw8k, 8000).unwrap();
        assert_eq!(pcm.len(), 640);
        assert!(pcm.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_round_trip_preserves_length() {
        // +/-1 sample of rounding tolerance per conversion
        for encoding in [AudioEncoding::Ulaw8k, AudioEncoding::Pcm16Be, AudioEncoding::Pcm16Le] {
            let unit = if encoding == AudioEncoding::Ulaw8k { 1 } else { 2 };
            let frame: Vec<u8> = (0..160 * unit).map(|i| (i % 251) as u8).collect();

            let forward = to_backend(&frame, encoding, 8000).unwrap();
            let back = from_backend(&forward, encoding, 8000).unwrap();

            let diff = (back.len() as i64 - frame.len() as i64).abs();
            assert!(
                diff <= 2 * unit as i64,
                "{:?}: {} -> {} -> {}",
                encoding,
                frame.len(),
                forward.len(),
                back.len()
            );
        }
    }

    #[test]
    fn test_big_endian_path_swaps_back() {
        // One BE sample 0x1234 at 16 kHz declared rate: no resampling, so the
        // round trip is byte-exact
        let frame = vec![0x12u8, 0x34];
        let pcm = to_backend(&frame, AudioEncoding::Pcm16Be, 16_000).unwrap();
        assert_eq!(pcm, vec![0x34, 0x12]);
        let back = from_backend(&pcm, AudioEncoding::Pcm16Be, 16_000).unwrap();
        assert_eq!(back, frame);
    }
}
