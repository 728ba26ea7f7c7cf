//! # G.711 mu-law Companding
//!
//! The telephony side delivers voice as 8-bit mu-law: a logarithmic encoding
//! that fits roughly 14 bits of dynamic range into one byte per sample. Both
//! directions of the bridge need it — inbound audio is expanded to linear
//! 16-bit PCM before resampling, outbound audio is compressed back after.
//!
//! Implements the standard G.711 segment encoding: bias 0x84, clip at 32635,
//! 8 exponent segments, output bits inverted on the wire. Digital silence is
//! the byte 0xFF (linear 0).

/// Bias added before segment search, per G.711.
const BIAS: i32 = 0x84;

/// Largest magnitude representable after biasing.
const CLIP: i32 = 32_635;

/// Expand one mu-law byte to a linear 16-bit sample.
pub fn decode(byte: u8) -> i16 {
    // Wire bytes are inverted
    let b = !byte;
    let sign = b & 0x80;
    let exponent = ((b >> 4) & 0x07) as i32;
    let mantissa = (b & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;

    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Compress one linear 16-bit sample to a mu-law byte.
pub fn encode(sample: i16) -> u8 {
    let sign: u8 = if sample < 0 { 0x80 } else { 0 };

    // Work in i32: negating i16::MIN would overflow
    let mut magnitude = (sample as i32).abs();
    if magnitude > CLIP {
        magnitude = CLIP;
    }
    magnitude += BIAS;

    // Find the segment: highest set bit above the mantissa window
    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && (magnitude & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }

    let mantissa = ((magnitude >> (exponent + 3)) & 0x0F) as u8;

    !(sign | (exponent << 4) | mantissa)
}

/// Expand a whole mu-law buffer to linear samples.
pub fn decode_buffer(data: &[u8]) -> Vec<i16> {
    data.iter().map(|&b| decode(b)).collect()
}

/// Compress a whole linear buffer to mu-law bytes.
pub fn encode_buffer(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| encode(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_round_trip() {
        // Digital silence is 0xFF on the wire and 0 linear
        assert_eq!(encode(0), 0xFF);
        assert_eq!(decode(0xFF), 0);
    }

    #[test]
    fn test_sign_symmetry() {
        for &s in &[1i16, 100, 1000, 10_000, 30_000] {
            let pos = decode(encode(s));
            let neg = decode(encode(-s));
            assert_eq!(pos, -neg, "asymmetric companding at {}", s);
        }
    }

    #[test]
    fn test_round_trip_error_bounded() {
        // Quantization error grows with the segment; reconstruction is
        // centered, so it never exceeds half the 1024-wide top segment step
        for s in (-32_000..32_000).step_by(37) {
            let decoded = decode(encode(s)) as i32;
            let err = (decoded - s as i32).abs();
            assert!(err <= 512, "sample {} decoded to {} (error {})", s, decoded, err);
        }
    }

    #[test]
    fn test_extremes_clip_without_overflow() {
        // i16::MIN must not overflow on negation and must land near the clip
        let lo = decode(encode(i16::MIN));
        let hi = decode(encode(i16::MAX));
        assert!(lo <= -31_000);
        assert!(hi >= 31_000);
    }

    #[test]
    fn test_buffer_helpers() {
        let samples = vec![0i16, 1234, -1234, 30_000];
        let bytes = encode_buffer(&samples);
        assert_eq!(bytes.len(), samples.len());
        let back = decode_buffer(&bytes);
        assert_eq!(back.len(), samples.len());
        assert!(decode_buffer(&[]).is_empty());
    }
}
