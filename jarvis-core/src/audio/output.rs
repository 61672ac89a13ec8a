//! cpal-backed output device for the playback scheduler.
//!
//! The device clock is the number of frames the output callback has rendered
//! divided by the device rate. Scheduled segments become voices pinned to a
//! start frame; the callback mixes whichever voices overlap the block it is
//! rendering and retires the ones that have finished.
//!
//! When a segment is converted to the device rate, its frame span is taken
//! from the rounded start and end times, not from the converted length, so a
//! segment scheduled at the previous one's end starts on exactly the frame
//! where that one stopped.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;

use crate::{
    audio::resample,
    buffering::chunk::AudioChunk,
    error::{JarvisError, Result},
    playback::OutputDevice,
};

#[derive(Debug)]
struct Voice {
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Mono render timeline shared between the playback thread and the callback.
#[derive(Debug, Default)]
pub(crate) struct Timeline {
    /// Frames rendered so far.
    position: u64,
    voices: VecDeque<Voice>,
}

impl Timeline {
    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn add(&mut self, start_frame: u64, samples: Vec<f32>) {
        self.voices.push_back(Voice {
            start_frame,
            samples,
        });
    }

    /// Render the next `out.len()` mono frames and advance the position.
    pub(crate) fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let begin = self.position;
        let end = begin + out.len() as u64;

        for voice in &self.voices {
            if voice.start_frame >= end || voice.end_frame() <= begin {
                continue;
            }
            let from = voice.start_frame.max(begin);
            let to = voice.end_frame().min(end);
            let src = &voice.samples[(from - voice.start_frame) as usize..(to - voice.start_frame) as usize];
            let dst = &mut out[(from - begin) as usize..(to - begin) as usize];
            for (d, s) in dst.iter_mut().zip(src) {
                *d += *s;
            }
        }

        self.voices.retain(|v| v.end_frame() > end);
        self.position = end;
    }
}

/// Maps scheduled segments onto device frames.
#[derive(Debug)]
pub(crate) struct SegmentPlacer {
    device_rate: u32,
    /// End frame of the last placed segment.
    end_frame: Option<u64>,
    /// Tail of the last placed segment, at `history_rate`.
    history: Vec<f32>,
    history_rate: u32,
}

impl SegmentPlacer {
    pub(crate) fn new(device_rate: u32) -> Self {
        Self {
            device_rate,
            end_frame: None,
            history: Vec::with_capacity(resample::EDGE_PAD),
            history_rate: 0,
        }
    }

    /// Start frame and device-rate samples for `segment` starting at `start_at`.
    pub(crate) fn place(&mut self, segment: &AudioChunk, start_at: f64) -> Result<(u64, Vec<f32>)> {
        let rate = self.device_rate as f64;
        let start_frame = (start_at * rate).round() as u64;
        let end_frame = ((start_at + segment.duration_secs()) * rate).round() as u64;
        let len = end_frame.saturating_sub(start_frame) as usize;

        let continuous =
            self.end_frame == Some(start_frame) && self.history_rate == segment.sample_rate;
        let history: &[f32] = if continuous { &self.history } else { &[] };
        let samples = resample::convert_continuing(
            history,
            &segment.samples,
            segment.sample_rate,
            self.device_rate,
            len,
        )?;

        let keep = segment.samples.len().min(resample::EDGE_PAD);
        self.history.clear();
        self.history
            .extend_from_slice(&segment.samples[segment.samples.len() - keep..]);
        self.history_rate = segment.sample_rate;
        self.end_frame = Some(end_frame);

        Ok((start_frame, samples))
    }
}

/// Output stream that plays segments at scheduled device times.
///
/// **Not `Send`**: create and drop on the same OS thread.
pub struct CpalOutput {
    #[cfg(feature = "audio-cpal")]
    _stream: cpal::Stream,
    timeline: Arc<Mutex<Timeline>>,
    /// Mirror of `Timeline::position` readable without the lock.
    frames_rendered: Arc<AtomicU64>,
    fault: Arc<AtomicBool>,
    device_rate: u32,
    placer: SegmentPlacer,
}

impl CpalOutput {
    /// Native rate of the opened stream.
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    pub fn has_faulted(&self) -> bool {
        self.fault.load(Ordering::Acquire)
    }
}

#[cfg(feature = "audio-cpal")]
impl CpalOutput {
    /// Open an output device, preferring a stream at `preferred_rate` so
    /// segments need no conversion.
    ///
    /// # Errors
    /// `NoDefaultOutputDevice`, `AudioDevice` or `AudioStream`. The caller
    /// treats any of these as a failed session setup.
    pub fn open(preferred_device_name: Option<&str>, preferred_rate: u32) -> Result<Self> {
        use cpal::traits::{DeviceTrait, StreamTrait};
        use cpal::SampleFormat;
        use tracing::info;

        let host = cpal::default_host();
        let device = super::device::select_output_device(&host, preferred_device_name)?;

        let supported = device
            .supported_output_configs()
            .ok()
            .and_then(|mut ranges| {
                ranges.find(|r| {
                    r.sample_format() == SampleFormat::F32
                        && r.min_sample_rate().0 <= preferred_rate
                        && r.max_sample_rate().0 >= preferred_rate
                })
            })
            .map(|r| r.with_sample_rate(cpal::SampleRate(preferred_rate)));
        let supported = match supported {
            Some(s) => s,
            None => device
                .default_output_config()
                .map_err(|e| JarvisError::AudioDevice(e.to_string()))?,
        };

        let device_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(device_rate, channels, preferred_rate, "playback config selected");

        let config = cpal::StreamConfig {
            channels,
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let timeline = Arc::new(Mutex::new(Timeline::default()));
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let fault = Arc::new(AtomicBool::new(false));
        let shared = Shared {
            timeline: Arc::clone(&timeline),
            frames_rendered: Arc::clone(&frames_rendered),
            fault: Arc::clone(&fault),
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_output::<f32>(&device, &config, shared),
            SampleFormat::I16 => build_output::<i16>(&device, &config, shared),
            SampleFormat::I32 => build_output::<i32>(&device, &config, shared),
            SampleFormat::U16 => build_output::<u16>(&device, &config, shared),
            fmt => {
                return Err(JarvisError::AudioStream(format!(
                    "unsupported playback sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| JarvisError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| JarvisError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            timeline,
            frames_rendered,
            fault,
            device_rate,
            placer: SegmentPlacer::new(device_rate),
        })
    }
}

#[cfg(not(feature = "audio-cpal"))]
impl CpalOutput {
    pub fn open(_preferred_device_name: Option<&str>, _preferred_rate: u32) -> Result<Self> {
        Err(JarvisError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

#[cfg(feature = "audio-cpal")]
struct Shared {
    timeline: Arc<Mutex<Timeline>>,
    frames_rendered: Arc<AtomicU64>,
    fault: Arc<AtomicBool>,
}

#[cfg(feature = "audio-cpal")]
fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Shared,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    use cpal::traits::DeviceTrait;
    use cpal::Sample;

    let channels = (config.channels as usize).max(1);
    let Shared {
        timeline,
        frames_rendered,
        fault,
    } = shared;
    let mut mono: Vec<f32> = Vec::with_capacity(8192);

    device.build_output_stream(
        config,
        move |data: &mut [T], _info| {
            let frames = data.len() / channels;
            mono.resize(frames, 0.0);
            {
                let mut timeline = timeline.lock();
                timeline.render(&mut mono);
                frames_rendered.store(timeline.position(), Ordering::Release);
            }
            for (frame, value) in data.chunks_exact_mut(channels).zip(&mono) {
                let sample = T::from_sample(*value);
                frame.fill(sample);
            }
        },
        move |err| {
            tracing::error!("playback stream error: {err}");
            fault.store(true, Ordering::Release);
        },
        None,
    )
}

impl OutputDevice for CpalOutput {
    fn current_time(&self) -> f64 {
        self.frames_rendered.load(Ordering::Acquire) as f64 / self.device_rate as f64
    }

    fn schedule(&mut self, segment: &AudioChunk, start_at: f64) -> Result<()> {
        if self.has_faulted() {
            return Err(JarvisError::AudioStream("playback stream has failed".into()));
        }

        let (start_frame, samples) = self.placer.place(segment, start_at)?;
        self.timeline.lock().add(start_frame, samples);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_back_to_back_voices_without_gap() {
        let mut timeline = Timeline::default();
        timeline.add(0, vec![0.1; 3]);
        timeline.add(3, vec![0.2; 3]);

        let mut out = [9.0f32; 4];
        timeline.render(&mut out);
        assert_eq!(out, [0.1, 0.1, 0.1, 0.2]);

        timeline.render(&mut out);
        assert_eq!(out, [0.2, 0.2, 0.0, 0.0]);
        assert_eq!(timeline.position(), 8);
        assert_eq!(timeline.voices.len(), 0);
    }

    #[test]
    fn future_voice_waits_for_its_frame() {
        let mut timeline = Timeline::default();
        timeline.add(6, vec![0.5; 2]);

        let mut out = [0f32; 4];
        timeline.render(&mut out);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(timeline.voices.len(), 1);

        timeline.render(&mut out);
        assert_eq!(out, [0.0, 0.0, 0.5, 0.5]);
        assert_eq!(timeline.voices.len(), 0);
    }

    #[test]
    fn voice_scheduled_in_the_past_plays_its_remainder() {
        let mut timeline = Timeline::default();
        let mut out = [0f32; 4];
        timeline.render(&mut out);

        timeline.add(2, vec![0.1, 0.2, 0.3, 0.4]);
        timeline.render(&mut out);
        assert_eq!(out, [0.3, 0.4, 0.0, 0.0]);
    }

    #[test]
    fn odd_length_segments_tile_the_device_grid() {
        // 1001 samples at 24 kHz is 1839.3375 frames at 44.1 kHz.
        let mut placer = SegmentPlacer::new(44_100);
        let mut timeline = Timeline::default();
        let mut start_at = 0.0;
        let mut expected_start = 0;

        for _ in 0..6 {
            let segment = AudioChunk::new(vec![0.5; 1001], 24_000);
            let (start_frame, samples) = placer.place(&segment, start_at).unwrap();
            assert_eq!(start_frame, expected_start, "gap or overlap at {start_at}");
            assert!(
                samples.iter().all(|s| (s - 0.5).abs() < 0.01),
                "segment edge drooped"
            );

            expected_start = start_frame + samples.len() as u64;
            timeline.add(start_frame, samples);
            start_at += segment.duration_secs();
        }

        let mut out = vec![0f32; expected_start as usize];
        timeline.render(&mut out);
        assert!(out.iter().all(|s| (s - 0.5).abs() < 0.01));
        assert!(timeline.voices.is_empty());
    }

    #[test]
    fn segment_after_a_gap_starts_fresh() {
        let mut placer = SegmentPlacer::new(48_000);
        let first = AudioChunk::new(vec![0.2; 240], 24_000);
        placer.place(&first, 0.0).unwrap();

        let late = AudioChunk::new(vec![0.6; 240], 24_000);
        let (start_frame, samples) = placer.place(&late, 1.0).unwrap();
        assert_eq!(start_frame, 48_000);
        assert_eq!(samples.len(), 480);
        assert!(samples.iter().all(|s| (s - 0.6).abs() < 0.01));
    }
}
