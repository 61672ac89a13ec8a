//! Wire chunks exchanged with the remote speech model.
//!
//! ```json
//! { "data": "<base64 PCM16 LE>", "mimeType": "audio/pcm;rate=16000" }
//! ```
//!
//! Outbound (microphone) chunks are 16 kHz; inbound (model speech) chunks are
//! 24 kHz. Both are mono.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    buffering::chunk::AudioChunk,
    codec::{pcm16, text},
    error::{JarvisError, Result},
};

/// Microphone capture rate on the wire (Hz).
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Model speech rate on the wire (Hz).
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Samples per outbound capture block.
pub const CAPTURE_BLOCK_SIZE: usize = 4096;

const PCM_MEDIA_TYPE: &str = "audio/pcm";

/// `audio/pcm;rate=<N>` descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmDescriptor {
    /// `None` when the descriptor omitted the `rate` parameter.
    pub sample_rate: Option<u32>,
}

impl PcmDescriptor {
    pub fn with_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate: Some(sample_rate),
        }
    }

    pub fn rate_or(&self, default_rate: u32) -> u32 {
        self.sample_rate.unwrap_or(default_rate)
    }
}

impl fmt::Display for PcmDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sample_rate {
            Some(rate) => write!(f, "{PCM_MEDIA_TYPE};rate={rate}"),
            None => f.write_str(PCM_MEDIA_TYPE),
        }
    }
}

impl FromStr for PcmDescriptor {
    type Err = JarvisError;

    fn from_str(raw: &str) -> Result<Self> {
        let mut parts = raw.split(';').map(str::trim);
        let media_type = parts.next().unwrap_or_default();
        if !media_type.eq_ignore_ascii_case(PCM_MEDIA_TYPE) {
            return Err(JarvisError::UnsupportedMimeType(raw.to_string()));
        }

        let mut sample_rate = None;
        for param in parts {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("rate") {
                let rate = value
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|r| *r > 0)
                    .ok_or_else(|| JarvisError::UnsupportedMimeType(raw.to_string()))?;
                sample_rate = Some(rate);
            }
        }

        Ok(Self { sample_rate })
    }
}

/// A text-safe unit of audio plus its type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireChunk {
    pub data: String,
    pub mime_type: String,
}

impl WireChunk {
    /// Encode samples (PCM16 then base64) tagged with `rate`.
    pub fn from_samples(samples: &[f32], rate: u32) -> Self {
        Self::from_pcm16(&pcm16::samples_to_pcm16(samples), rate)
    }

    /// Wrap an existing PCM16 buffer.
    pub fn from_pcm16(pcm: &[u8], rate: u32) -> Self {
        Self {
            data: text::encode(pcm),
            mime_type: PcmDescriptor::with_rate(rate).to_string(),
        }
    }

    pub fn descriptor(&self) -> Result<PcmDescriptor> {
        self.mime_type.parse()
    }

    /// Decode the payload to raw PCM16 bytes.
    pub fn pcm16(&self) -> Result<Vec<u8>> {
        text::decode(&self.data)
    }

    /// Decode into a playable segment. `default_rate` applies when the
    /// descriptor carries no `rate` parameter.
    pub fn decode_segment(&self, default_rate: u32) -> Result<AudioChunk> {
        let rate = self.descriptor()?.rate_or(default_rate);
        let samples = pcm16::pcm16_to_samples(&self.pcm16()?)?;
        Ok(AudioChunk::new(samples, rate))
    }
}
