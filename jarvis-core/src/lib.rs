//! # jarvis-core
//!
//! Live voice core for the Jarvis assistant: audio codecs, WAV export and
//! gapless playback of streamed model speech.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → capture_loop (resample, frame)
//!                                                    │
//!                                   CapturePipeline: pcm16 → base64 → WireChunk
//!                                                    │
//!                                       outbound Receiver (transport, external)
//!
//! inbound Sender (transport, external) → playback_loop
//!                                             │
//!                          PlaybackScheduler: base64 → pcm16 → AudioChunk
//!                                             │
//!                              max(next_start_time, now) → CpalOutput
//! ```
//!
//! The input callback is lock-free; the playback cursor is owned by a single
//! thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod capture;
pub mod codec;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod playback;
pub mod wire;

// Convenience re-exports for downstream crates
pub use buffering::chunk::AudioChunk;
pub use capture::{CaptureOutcome, CapturePipeline};
pub use engine::{EngineConfig, LiveSession, VoiceEngine};
pub use error::{JarvisError, Result};
pub use ipc::events::{EngineStatus, EngineStatusEvent, SpeakingEvent};
pub use playback::{OutputDevice, PlaybackScheduler, ScheduledSegment};
pub use wire::{PcmDescriptor, WireChunk};
