//! Canonical 44-byte RIFF/WAVE container for PCM16 payloads.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//!  0  "RIFF"        4  36 + data_len   8  "WAVE"
//! 12  "fmt "       16  16             20  format = 1 (PCM)
//! 22  channels     24  sample_rate    28  byte_rate
//! 32  block_align  34  bits           36  "data"
//! 40  data_len     44  payload…
//! ```
//!
//! Every header field is derived from the payload length and `WavFormat`;
//! there is no way to set them independently.

use std::path::Path;

use tracing::info;

use crate::error::{JarvisError, Result};

/// Size of the canonical header (RIFF + fmt + data chunk headers).
pub const WAV_HEADER_SIZE: usize = 44;

/// Byte offset of the RIFF chunk size field.
const RIFF_SIZE_OFFSET: usize = 4;

/// Byte offset of the data chunk size field.
const DATA_SIZE_OFFSET: usize = 40;

/// RIFF size counts everything after the first 8 bytes.
const RIFF_SIZE_BASE: u32 = WAV_HEADER_SIZE as u32 - 8;

/// Size of the PCM fmt chunk body.
const FMT_CHUNK_SIZE: u32 = 16;

/// Audio format code for uncompressed PCM.
const FORMAT_PCM: u16 = 1;

/// Default file name for downloaded speech.
pub const DEFAULT_DOWNLOAD_NAME: &str = "jarvis-audio.wav";

/// Sample layout described by the `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl WavFormat {
    /// Mono 16-bit PCM at `sample_rate`.
    pub fn pcm16_mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
        }
    }

    /// Bytes per frame; `None` when the product does not fit the header field.
    pub fn block_align(&self) -> Option<u16> {
        self.channels.checked_mul(self.bits_per_sample / 8)
    }

    /// Bytes per second; `None` when the product does not fit the header field.
    pub fn byte_rate(&self) -> Option<u32> {
        self.sample_rate.checked_mul(u32::from(self.block_align()?))
    }
}

/// Wrap a raw PCM payload in a WAV header.
///
/// # Errors
/// - `InvalidWav` when the format has no whole-byte frame or its derived
///   fields overflow, or the payload exceeds the 32-bit size fields.
/// - `TruncatedFrame` when `pcm` is not a whole number of frames.
pub fn write_wav(pcm: &[u8], format: WavFormat) -> Result<Vec<u8>> {
    let (block_align, byte_rate) = match (format.block_align(), format.byte_rate()) {
        (Some(align), Some(rate)) if align > 0 => (align, rate),
        _ => return Err(JarvisError::InvalidWav(format!("unusable format {format:?}"))),
    };
    if pcm.len() % usize::from(block_align) != 0 {
        return Err(JarvisError::TruncatedFrame { len: pcm.len() });
    }
    let data_len = u32::try_from(pcm.len())
        .ok()
        .filter(|len| len.checked_add(RIFF_SIZE_BASE).is_some())
        .ok_or_else(|| JarvisError::InvalidWav(format!("{} byte payload", pcm.len())))?;

    let mut out = Vec::with_capacity(WAV_HEADER_SIZE + pcm.len());

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(RIFF_SIZE_BASE + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&FMT_CHUNK_SIZE.to_le_bytes());
    out.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&format.channels.to_le_bytes());
    out.extend_from_slice(&format.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&format.bits_per_sample.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    Ok(out)
}

/// Write a WAV file for `pcm` at `path`, creating parent directories.
///
/// The payload is validated before anything touches the filesystem.
pub fn write_wav_file(path: &Path, pcm: &[u8], format: WavFormat) -> Result<()> {
    let wav = write_wav(pcm, format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, wav)?;
    info!(
        path = %path.display(),
        bytes = pcm.len(),
        sample_rate = format.sample_rate,
        "wrote wav file"
    );
    Ok(())
}

/// Header fields read back from a canonical WAV buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub riff_size: u32,
    pub format: WavFormat,
    pub byte_rate: u32,
    pub block_align: u16,
    pub data_len: u32,
}

impl WavHeader {
    /// Parse the 44-byte canonical header. Files with extension chunks are not
    /// recognised; this reader only validates what `write_wav` produces.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < WAV_HEADER_SIZE {
            return Err(invalid(format!("{} bytes is shorter than a header", bytes.len())));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(invalid("missing RIFF/WAVE magic".into()));
        }
        if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
            return Err(invalid("not a canonical fmt/data layout".into()));
        }
        if read_u32(bytes, 16) != FMT_CHUNK_SIZE || read_u16(bytes, 20) != FORMAT_PCM {
            return Err(invalid("fmt chunk is not plain PCM".into()));
        }

        Ok(Self {
            riff_size: read_u32(bytes, RIFF_SIZE_OFFSET),
            format: WavFormat {
                channels: read_u16(bytes, 22),
                sample_rate: read_u32(bytes, 24),
                bits_per_sample: read_u16(bytes, 34),
            },
            byte_rate: read_u32(bytes, 28),
            block_align: read_u16(bytes, 32),
            data_len: read_u32(bytes, DATA_SIZE_OFFSET),
        })
    }

    /// True when every derived field agrees with the payload and format.
    pub fn is_consistent(&self, total_len: usize) -> bool {
        self.data_len.checked_add(RIFF_SIZE_BASE) == Some(self.riff_size)
            && Some(self.byte_rate) == self.format.byte_rate()
            && Some(self.block_align) == self.format.block_align()
            && WAV_HEADER_SIZE + self.data_len as usize == total_len
    }
}

fn invalid(reason: String) -> JarvisError {
    JarvisError::InvalidWav(format!("header: {reason}"))
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_matches_reference_bytes() {
        let wav = write_wav(&[0x01, 0x02, 0x03, 0x04], WavFormat::pcm16_mono(24_000)).unwrap();
        let expected: [u8; 44] = [
            b'R', b'I', b'F', b'F', 40, 0, 0, 0, b'W', b'A', b'V', b'E', //
            b'f', b'm', b't', b' ', 16, 0, 0, 0, 1, 0, 1, 0, //
            0xc0, 0x5d, 0, 0, // 24000
            0x80, 0xbb, 0, 0, // 48000
            2, 0, 16, 0, //
            b'd', b'a', b't', b'a', 4, 0, 0, 0,
        ];
        assert_eq!(&wav[..44], &expected);
        assert_eq!(&wav[44..], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn sizes_track_payload_length() {
        for len in [0usize, 2, 480, 48_000] {
            let pcm = vec![0u8; len];
            let wav = write_wav(&pcm, WavFormat::pcm16_mono(24_000)).unwrap();
            assert_eq!(wav.len(), WAV_HEADER_SIZE + len);

            let header = WavHeader::parse(&wav).unwrap();
            assert_eq!(header.data_len as usize, len);
            assert_eq!(header.riff_size as usize, 36 + len);
            assert!(header.is_consistent(wav.len()));
        }
    }

    #[test]
    fn derived_rates_for_stereo() {
        let format = WavFormat {
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
        };
        assert_eq!(format.block_align(), Some(4));
        assert_eq!(format.byte_rate(), Some(176_400));
    }

    #[test]
    fn oversized_format_is_rejected_not_overflowed() {
        let format = WavFormat {
            sample_rate: 48_000,
            channels: u16::MAX,
            bits_per_sample: 16,
        };
        assert_eq!(format.block_align(), None);
        assert!(matches!(
            write_wav(&[0u8; 4], format),
            Err(JarvisError::InvalidWav(_))
        ));

        let huge_rate = WavFormat {
            sample_rate: u32::MAX,
            channels: 2,
            bits_per_sample: 16,
        };
        assert_eq!(huge_rate.byte_rate(), None);
        assert!(write_wav(&[0u8; 4], huge_rate).is_err());

        let no_bytes = WavFormat {
            sample_rate: 8_000,
            channels: 1,
            bits_per_sample: 4,
        };
        assert!(matches!(
            write_wav(&[], no_bytes),
            Err(JarvisError::InvalidWav(_))
        ));
    }

    #[test]
    fn odd_pcm16_payload_is_a_truncated_frame() {
        let err = write_wav(&[0x01, 0x02, 0x03], WavFormat::pcm16_mono(24_000)).unwrap_err();
        assert!(matches!(err, JarvisError::TruncatedFrame { len: 3 }), "{err:?}");

        let path = std::env::temp_dir().join(format!("jarvis-odd-{}.wav", std::process::id()));
        let err = write_wav_file(&path, &[0x01], WavFormat::pcm16_mono(24_000)).unwrap_err();
        assert!(matches!(err, JarvisError::TruncatedFrame { len: 1 }), "{err:?}");
        assert!(!path.exists(), "nothing is written for a rejected payload");
    }

    #[test]
    fn parse_rejects_short_or_foreign_buffers() {
        assert!(WavHeader::parse(&[0u8; 10]).is_err());
        let mut wav = write_wav(&[], WavFormat::pcm16_mono(16_000)).unwrap();
        wav[0] = b'X';
        assert!(WavHeader::parse(&wav).is_err());
    }

    #[test]
    fn hound_reads_written_file() {
        let samples: Vec<i16> = vec![0, 1000, -1000, i16::MAX, i16::MIN];
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        let path = std::env::temp_dir().join(format!("jarvis-wav-{}.wav", std::process::id()));
        write_wav_file(&path, &pcm, WavFormat::pcm16_mono(24_000)).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, samples);

        let _ = std::fs::remove_file(&path);
    }
}
