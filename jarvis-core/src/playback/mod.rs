//! Gapless playback scheduling.
//!
//! ## Algorithm
//!
//! The scheduler owns a single cursor, `next_start_time`, on the output
//! device's clock. For every arriving segment of duration `d`:
//!
//! 1. `start_at = max(next_start_time, device.current_time())`
//! 2. the device is told to start the segment at `start_at`
//! 3. `next_start_time = start_at + d`
//!
//! Segments that arrive early queue back-to-back with no gap. A segment that
//! arrives after the cursor has fallen behind the device clock starts
//! immediately, so a network stall never turns into permanent drift.
//!
//! Rejected segments (empty, undecodable, refused by the device) leave the
//! cursor untouched.
//!
//! ## Ownership
//!
//! One `PlaybackScheduler` exists per live session and is only ever touched
//! by the playback loop thread; inbound chunks reach it through a
//! single-consumer channel. Nothing here is global.

pub mod simulated;

pub use simulated::{SimulatedClock, SimulatedOutput};

use std::time::Duration;

use tracing::debug;

use crate::{
    buffering::chunk::AudioChunk,
    error::{JarvisError, Result},
    wire::WireChunk,
};

/// Default hold time for the speaking flag after the last segment ends.
pub const DEFAULT_SPEAKING_GRACE: Duration = Duration::from_millis(500);

/// An audio sink with a monotonic clock that can start segments at a given time.
pub trait OutputDevice {
    /// Current position of the device clock in seconds.
    fn current_time(&self) -> f64;

    /// Start `segment` at `start_at` seconds on the device clock.
    ///
    /// `start_at` is never earlier than `current_time()` at the moment of the
    /// call.
    fn schedule(&mut self, segment: &AudioChunk, start_at: f64) -> Result<()>;
}

impl<O: OutputDevice + ?Sized> OutputDevice for Box<O> {
    fn current_time(&self) -> f64 {
        (**self).current_time()
    }

    fn schedule(&mut self, segment: &AudioChunk, start_at: f64) -> Result<()> {
        (**self).schedule(segment, start_at)
    }
}

/// Where a segment landed on the device timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSegment {
    pub start_at: f64,
    pub duration: f64,
    /// `true` when this segment flipped the speaking flag on.
    pub started_speaking: bool,
}

impl ScheduledSegment {
    pub fn end_at(&self) -> f64 {
        self.start_at + self.duration
    }
}

/// Playback scheduler bound to one output device for one session.
pub struct PlaybackScheduler<O: OutputDevice> {
    output: O,
    next_start_time: f64,
    default_rate: u32,
    grace_secs: f64,
    speaking: bool,
}

impl<O: OutputDevice> PlaybackScheduler<O> {
    /// `default_rate` is used for wire chunks whose descriptor omits a rate.
    pub fn new(output: O, default_rate: u32) -> Self {
        Self::with_grace(output, default_rate, DEFAULT_SPEAKING_GRACE)
    }

    pub fn with_grace(output: O, default_rate: u32, grace: Duration) -> Self {
        Self {
            output,
            next_start_time: 0.0,
            default_rate,
            grace_secs: grace.as_secs_f64(),
            speaking: false,
        }
    }

    /// Earliest time the next segment may begin.
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    /// Place `segment` directly after the previous one, or now if we are behind.
    pub fn schedule_segment(&mut self, segment: &AudioChunk) -> Result<ScheduledSegment> {
        let duration = segment.duration_secs();
        if segment.is_empty() || duration <= 0.0 {
            return Err(JarvisError::EmptySegment);
        }

        let start_at = self.next_start_time.max(self.output.current_time());
        self.output.schedule(segment, start_at)?;
        self.next_start_time = start_at + duration;

        let started_speaking = !self.speaking;
        self.speaking = true;

        debug!(
            start_at,
            duration,
            next_start_time = self.next_start_time,
            "segment scheduled"
        );

        Ok(ScheduledSegment {
            start_at,
            duration,
            started_speaking,
        })
    }

    /// Decode a wire chunk and schedule it.
    ///
    /// Decode failures are returned for this chunk only; the cursor is not
    /// moved and the scheduler stays usable.
    pub fn submit(&mut self, chunk: &WireChunk) -> Result<ScheduledSegment> {
        let segment = chunk.decode_segment(self.default_rate)?;
        self.schedule_segment(&segment)
    }

    /// Advance the speaking flag. Returns `Some(false)` on the tick where the
    /// grace period after the last segment has elapsed.
    pub fn tick(&mut self) -> Option<bool> {
        if self.speaking && self.output.current_time() >= self.next_start_time + self.grace_secs {
            self.speaking = false;
            return Some(false);
        }
        None
    }

    /// Seconds of audio scheduled but not yet played.
    pub fn queued_secs(&self) -> f64 {
        (self.next_start_time - self.output.current_time()).max(0.0)
    }

    /// Forget the timeline (new live session).
    pub fn reset(&mut self) {
        self.next_start_time = 0.0;
        self.speaking = false;
    }
}
