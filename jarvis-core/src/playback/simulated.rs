//! Headless output device with a hand-driven clock.
//!
//! Records every scheduled segment instead of rendering it. Used by tests and
//! by hosts that want to dry-run a session without touching audio hardware.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::{
    buffering::chunk::AudioChunk,
    error::{JarvisError, Result},
    playback::OutputDevice,
};

/// Shared, manually advanced device clock (seconds).
#[derive(Debug, Clone, Default)]
pub struct SimulatedClock(Arc<AtomicU64>);

impl SimulatedClock {
    pub fn now(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, secs: f64) {
        self.0.store(secs.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, secs: f64) {
        self.set(self.now() + secs);
    }
}

/// One segment as the device saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSegment {
    pub start_at: f64,
    pub duration: f64,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

#[derive(Debug, Default)]
pub struct SimulatedOutput {
    clock: SimulatedClock,
    scheduled: Vec<RecordedSegment>,
    fail_next: Option<String>,
}

impl SimulatedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: SimulatedClock) -> Self {
        Self {
            clock,
            ..Self::default()
        }
    }

    pub fn clock(&self) -> SimulatedClock {
        self.clock.clone()
    }

    pub fn scheduled(&self) -> &[RecordedSegment] {
        &self.scheduled
    }

    /// Make the next `schedule` call fail with an `AudioStream` error.
    pub fn fail_next(&mut self, reason: &str) {
        self.fail_next = Some(reason.to_string());
    }
}

impl OutputDevice for SimulatedOutput {
    fn current_time(&self) -> f64 {
        self.clock.now()
    }

    fn schedule(&mut self, segment: &AudioChunk, start_at: f64) -> Result<()> {
        if let Some(reason) = self.fail_next.take() {
            return Err(JarvisError::AudioStream(reason));
        }
        self.scheduled.push(RecordedSegment {
            start_at,
            duration: segment.duration_secs(),
            samples: segment.samples.clone(),
            sample_rate: segment.sample_rate,
        });
        Ok(())
    }
}
