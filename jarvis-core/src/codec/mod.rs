//! Audio codecs: text transport encoding, PCM16 samples and the WAV container.
//!
//! ```text
//! f32 samples ──pcm16──► PCM16 LE bytes ──text──► base64 wire payload
//!                              │
//!                              └──wav──► RIFF/WAVE download
//! ```

pub mod pcm16;
pub mod text;
pub mod wav;

pub use pcm16::{pcm16_to_samples, samples_to_pcm16, samples_to_pcm16_into};
pub use wav::{write_wav, write_wav_file, WavFormat, WavHeader};
