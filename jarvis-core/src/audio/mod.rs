//! Audio device I/O via cpal.
//!
//! # Design constraints
//!
//! cpal callbacks run on OS audio threads at elevated priority. They must not
//! block, perform I/O or grow heap buffers in steady state:
//!
//! - the input callback downmixes into a pre-reserved scratch buffer and
//!   pushes into an SPSC ring (`push_slice` is wait-free);
//! - the output callback renders from a short-held `parking_lot` mutex that
//!   the playback thread only takes to append a segment.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms. `AudioCapture` and
//! `CpalOutput` must be created and dropped on the same thread; the engine
//! opens them inside the `spawn_blocking` closures that own them.

pub mod device;
pub mod output;
pub mod resample;

pub use output::CpalOutput;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
};

use crate::{
    buffering::AudioProducer,
    error::{JarvisError, Result},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Scratch frames reserved for the downmix buffer so typical callbacks never
/// reallocate.
#[cfg(feature = "audio-cpal")]
const MIX_RESERVE_FRAMES: usize = 8192;

/// Handle to an active microphone stream.
///
/// **Not `Send`**: create and drop on the same OS thread.
pub struct AudioCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Set to `false` to make the callback a no-op.
    running: Arc<AtomicBool>,
    /// Raised by the stream error callback (device removed, permission revoked).
    fault: Arc<AtomicBool>,
    /// Native device rate; the capture loop resamples to the wire rate.
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Open an input device and push mono f32 frames into `producer`.
    ///
    /// # Errors
    /// `NoDefaultInputDevice` when no microphone exists, `AudioDevice` /
    /// `AudioStream` when the device refuses the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open(
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = device::select_input_device(&host, preferred_device_name)?;

        let supported = device
            .default_input_config()
            .map_err(|e| JarvisError::AudioDevice(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, "capture config selected");

        let config = StreamConfig {
            channels,
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        let fault = Arc::new(AtomicBool::new(false));

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_input::<f32>(&device, &config, producer, &running, &fault),
            SampleFormat::I16 => build_input::<i16>(&device, &config, producer, &running, &fault),
            SampleFormat::I32 => build_input::<i32>(&device, &config, producer, &running, &fault),
            SampleFormat::U16 => build_input::<u16>(&device, &config, producer, &running, &fault),
            SampleFormat::U8 => build_input::<u8>(&device, &config, producer, &running, &fault),
            fmt => {
                return Err(JarvisError::AudioStream(format!(
                    "unsupported capture sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| JarvisError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| JarvisError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            fault,
            sample_rate,
        })
    }

    /// Shared fault flag, polled by the capture loop.
    pub fn fault_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fault)
    }

    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(feature = "audio-cpal")]
fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: AudioProducer,
    running: &Arc<AtomicBool>,
    fault: &Arc<AtomicBool>,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    use crate::buffering::Producer;

    let channels = (config.channels as usize).max(1);
    let running = Arc::clone(running);
    let fault = Arc::clone(fault);
    let mut mono: Vec<f32> = Vec::with_capacity(MIX_RESERVE_FRAMES);

    device.build_input_stream(
        config,
        move |data: &[T], _info| {
            if !running.load(Ordering::Relaxed) {
                return;
            }
            mono.clear();
            mono.extend(data.chunks_exact(channels).map(|frame| {
                frame.iter().map(|s| s.to_sample::<f32>()).sum::<f32>() / channels as f32
            }));
            let written = producer.push_slice(&mono);
            if written < mono.len() {
                warn!("capture ring full: dropped {} frames", mono.len() - written);
            }
        },
        move |err| {
            error!("capture stream error: {err}");
            fault.store(true, Ordering::Release);
        },
        None,
    )
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(JarvisError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}
