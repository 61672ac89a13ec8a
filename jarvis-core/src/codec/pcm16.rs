//! Float ↔ signed 16-bit little-endian PCM.
//!
//! ## Quantization
//!
//! Each sample is scaled by 32768, truncated toward zero and then wrapped
//! modulo 2^16 into an `i16`. Nothing is clamped: `1.0` becomes `-32768` and
//! `1.5` becomes `-16384`. Capture devices that overshoot [-1, 1] therefore
//! produce the same wrapped words the browser client has always sent.
//! Non-finite samples encode as silence.

use crate::error::{JarvisError, Result};

/// Scale between normalized floats and PCM16 words.
pub const PCM16_SCALE: f32 = 32768.0;

/// Bytes per PCM16 sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Convert one normalized sample to its PCM16 word.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    if !sample.is_finite() {
        return 0;
    }
    // f64 holds every f32 * 2^15 exactly, so truncation matches the wire.
    let scaled = (sample as f64 * PCM16_SCALE as f64).trunc();
    scaled.rem_euclid(65_536.0) as u16 as i16
}

/// Encode normalized samples as PCM16 LE bytes.
pub fn samples_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    samples_to_pcm16_into(samples, &mut out);
    out
}

/// Encode into a caller-owned buffer (cleared first). Does not allocate once
/// `out` has grown to the block size.
pub fn samples_to_pcm16_into(samples: &[f32], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(samples.len() * BYTES_PER_SAMPLE);
    for &s in samples {
        out.extend_from_slice(&quantize(s).to_le_bytes());
    }
}

/// Decode PCM16 LE bytes to normalized samples.
///
/// # Errors
/// `JarvisError::TruncatedFrame` when `bytes` has an odd length.
pub fn pcm16_to_samples(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % BYTES_PER_SAMPLE != 0 {
        return Err(JarvisError::TruncatedFrame { len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / PCM16_SCALE)
        .collect())
}

/// Number of samples held by a PCM16 buffer.
pub fn sample_count(bytes: &[u8]) -> usize {
    bytes.len() / BYTES_PER_SAMPLE
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: f32 = 1.0 / 32768.0;

    #[test]
    fn quantize_truncates_toward_zero() {
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(0.5), 16_384);
        assert_eq!(quantize(-0.5), -16_384);
        assert_eq!(quantize(-1.0), -32_768);
        // 1.9 steps truncates to 1 step, -1.9 steps to -1 step.
        assert_eq!(quantize(1.9 * STEP), 1);
        assert_eq!(quantize(-1.9 * STEP), -1);
    }

    #[test]
    fn out_of_range_samples_wrap_instead_of_clamping() {
        assert_eq!(quantize(1.0), -32_768);
        assert_eq!(quantize(1.5), -16_384);
        assert_eq!(quantize(-1.5), 16_384);
        assert_eq!(quantize(2.0), 0);
    }

    #[test]
    fn non_finite_samples_are_silence() {
        assert_eq!(quantize(f32::NAN), 0);
        assert_eq!(quantize(f32::INFINITY), 0);
        assert_eq!(quantize(f32::NEG_INFINITY), 0);
    }

    #[test]
    fn emits_little_endian_pairs_in_order() {
        let bytes = samples_to_pcm16(&[0.5, -STEP, 0.0]);
        assert_eq!(bytes, vec![0x00, 0x40, 0xff, 0xff, 0x00, 0x00]);
        assert_eq!(sample_count(&bytes), 3);
    }

    #[test]
    fn decodes_words_over_32768() {
        let samples = pcm16_to_samples(&[0x00, 0x80, 0xff, 0x7f, 0x00, 0x00]).unwrap();
        assert_eq!(samples, vec![-1.0, 32_767.0 / 32_768.0, 0.0]);
    }

    #[test]
    fn odd_length_is_truncated_frame() {
        let err = pcm16_to_samples(&[0x00, 0x40, 0x01]).unwrap_err();
        assert!(matches!(err, JarvisError::TruncatedFrame { len: 3 }), "{err:?}");
    }

    #[test]
    fn round_trip_error_within_one_step() {
        let x: Vec<f32> = (0..2000).map(|i| -1.0 + i as f32 * 0.000_999_7).collect();
        let y = pcm16_to_samples(&samples_to_pcm16(&x)).unwrap();
        assert_eq!(x.len(), y.len());
        for (a, b) in x.iter().zip(&y) {
            assert!((a - b).abs() <= STEP, "x={a} y={b}");
        }
    }

    #[test]
    fn into_variant_reuses_buffer() {
        let mut out = Vec::with_capacity(8);
        samples_to_pcm16_into(&[0.25, 0.25, 0.25, 0.25], &mut out);
        assert_eq!(out.len(), 8);
        samples_to_pcm16_into(&[0.25], &mut out);
        assert_eq!(out, vec![0x00, 0x20]);
    }
}
