//! Blocking capture loop.
//!
//! ```text
//! 1. Drain the ring (device-rate mono f32)
//! 2. Resample to the wire rate
//! 3. Frame into fixed blocks
//! 4. CapturePipeline::process_block → outbound queue (fire-and-forget)
//! ```
//!
//! Runs on its own blocking thread next to the `AudioCapture` that feeds the
//! ring, and returns when the session stops or the device faults.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::Sender;
use tracing::{debug, error, info, warn};

use crate::{
    audio::resample::RateConverter,
    buffering::{AudioConsumer, BlockFramer, Consumer},
    capture::{CapturePipeline, CaptureStats},
    wire::WireChunk,
};

/// Samples drained from the ring per iteration (20 ms at 48 kHz).
const DRAIN_CHUNK: usize = 960;

/// Sleep when the ring is empty.
const SLEEP_EMPTY: Duration = Duration::from_millis(5);

pub struct CaptureContext {
    pub consumer: AudioConsumer,
    pub running: Arc<AtomicBool>,
    /// Raised by the device error callback.
    pub device_fault: Arc<AtomicBool>,
    pub device_rate: u32,
    pub wire_rate: u32,
    pub block_size: usize,
    pub outbound: Sender<WireChunk>,
    pub stats: Arc<CaptureStats>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureExit {
    /// The session was stopped.
    Stopped,
    /// The device or the resampler failed; playback is unaffected.
    Failed(String),
}

/// Run until `ctx.running` clears or the device faults.
pub fn run(mut ctx: CaptureContext) -> CaptureExit {
    let mut resampler = match RateConverter::new(ctx.device_rate, ctx.wire_rate, DRAIN_CHUNK) {
        Ok(r) => r,
        Err(e) => {
            error!("failed to create capture resampler: {e}");
            return CaptureExit::Failed(e.to_string());
        }
    };

    info!(
        device_rate = ctx.device_rate,
        wire_rate = ctx.wire_rate,
        "capture loop started"
    );

    let mut raw = vec![0f32; DRAIN_CHUNK];
    let mut framer = BlockFramer::new(ctx.block_size);
    debug!(block_size = framer.block_size(), "framing capture blocks");
    let mut pipeline =
        CapturePipeline::with_stats(ctx.outbound.clone(), ctx.wire_rate, Arc::clone(&ctx.stats));

    let exit = loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break CaptureExit::Stopped;
        }
        if ctx.device_fault.load(Ordering::Acquire) {
            warn!("capture device failed, ending capture");
            break CaptureExit::Failed("capture device reported a stream error".into());
        }

        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(SLEEP_EMPTY);
            continue;
        }

        let converted = resampler.process(&raw[..n]);
        framer.push(&converted, |block| {
            pipeline.process_block(block);
        });
    };

    framer.clear();
    info!(?exit, "capture loop finished");
    exit
}
