//! Sample-rate conversion with rubato's `FastFixedIn`.
//!
//! Two shapes are needed:
//!
//! - **Streaming** (`RateConverter`): the capture loop feeds whatever the ring
//!   yields at the device rate and gets 16 kHz out. Partial chunks are held
//!   until rubato has a full input block.
//! - **Per segment** (`convert_continuing`): playback converts a whole 24 kHz
//!   segment to the output device rate at an exact output length, so that
//!   consecutive segments tile the device frame grid. The filter is primed
//!   with the tail of the previous segment (or the first sample repeated) and
//!   run past the end on the last sample repeated, so segment edges never see
//!   the zeros rubato starts and flushes with.
//!
//! Equal rates are a passthrough; no rubato session is created.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{error, info};

use crate::error::{JarvisError, Result};

/// Upper bound on flush calls when draining a one-shot resampler.
const MAX_FLUSH_PASSES: usize = 4;

/// Input samples of lead-in and run-out around a converted segment.
pub const EDGE_PAD: usize = 64;

/// Converts a mono f32 stream from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` in passthrough mode.
    resampler: Option<FastFixedIn<f32>>,
    /// Input waiting for a full `chunk_size` block.
    input_buf: Vec<f32>,
    chunk_size: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `JarvisError::AudioDevice` if rubato rejects the ratio or chunk size.
    pub fn new(from_rate: u32, to_rate: u32, chunk_size: usize) -> Result<Self> {
        if from_rate == to_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let resampler = new_resampler(from_rate, to_rate, chunk_size)?;
        let output_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];

        info!(from_rate, to_rate, chunk_size, "stream resampler ready");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            output_buf,
        })
    }

    /// Feed samples; returns whatever converted output is ready (may be empty).
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);
        let mut result = Vec::new();

        while self.input_buf.len() >= self.chunk_size {
            let block = &self.input_buf[..self.chunk_size];
            match resampler.process_into_buffer(&[block], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => error!("stream resampler error: {e}"),
            }
            self.input_buf.drain(..self.chunk_size);
        }

        result
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

/// Convert one complete segment from `from_rate` to `to_rate`.
///
/// The result has `round(len * to_rate / from_rate)` samples.
pub fn convert_segment(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    let expected = (samples.len() as f64 * to_rate as f64 / from_rate as f64).round() as usize;
    convert_continuing(&[], samples, from_rate, to_rate, expected)
}

/// Convert `samples` to exactly `out_len` samples at `to_rate`.
///
/// `history` is the input that played directly before `samples` (at
/// `from_rate`); pass an empty slice after a gap. Short results are padded
/// with the last converted sample, never with silence.
pub fn convert_continuing(
    history: &[f32],
    samples: &[f32],
    from_rate: u32,
    to_rate: u32,
    out_len: usize,
) -> Result<Vec<f32>> {
    let (Some(&first), Some(&last)) = (samples.first(), samples.last()) else {
        return Ok(vec![0.0; out_len]);
    };
    if from_rate == to_rate {
        return Ok(fit_len(samples.to_vec(), out_len));
    }

    let lead: Vec<f32> = if history.is_empty() {
        vec![first; EDGE_PAD]
    } else {
        history.to_vec()
    };
    let mut input = Vec::with_capacity(lead.len() + samples.len() + EDGE_PAD);
    input.extend_from_slice(&lead);
    input.extend_from_slice(samples);
    input.resize(input.len() + EDGE_PAD, last);

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = new_resampler(from_rate, to_rate, input.len())?;
    let skip = resampler.output_delay() + (lead.len() as f64 * ratio).round() as usize;

    let mut out = resampler
        .process(&[input.as_slice()], None)
        .map_err(|e| JarvisError::AudioStream(format!("segment resample: {e}")))?
        .swap_remove(0);

    for _ in 0..MAX_FLUSH_PASSES {
        if out.len() >= skip + out_len {
            break;
        }
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| JarvisError::AudioStream(format!("segment flush: {e}")))?;
        if tail[0].is_empty() {
            break;
        }
        out.extend_from_slice(&tail[0]);
    }

    out.drain(..skip.min(out.len()));
    Ok(fit_len(out, out_len))
}

fn fit_len(mut samples: Vec<f32>, len: usize) -> Vec<f32> {
    let fill = samples.last().copied().unwrap_or(0.0);
    samples.resize(len, fill);
    samples
}

fn new_resampler(from_rate: u32, to_rate: u32, chunk_size: usize) -> Result<FastFixedIn<f32>> {
    FastFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        1.0, // fixed ratio
        PolynomialDegree::Cubic,
        chunk_size,
        1, // mono
    )
    .map_err(|e| JarvisError::AudioDevice(format!("resampler init: {e}")))
}
