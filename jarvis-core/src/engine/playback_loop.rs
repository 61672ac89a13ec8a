//! Blocking playback loop: the only code path that touches the cursor.
//!
//! Inbound chunks arrive on a single-consumer channel in arrival order. The
//! loop decodes and schedules each one, then ticks the speaking flag. Bad
//! chunks are logged and dropped; they never end the session.
//!
//! When the inbound sender is dropped the loop keeps ticking until already
//! scheduled audio (plus the grace period) has played out, then returns.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    engine::diagnostics::SessionDiagnostics,
    ipc::events::SpeakingEvent,
    playback::{OutputDevice, PlaybackScheduler},
    wire::WireChunk,
};

/// How long to wait for inbound audio before ticking the speaking flag.
const TICK: Duration = Duration::from_millis(20);

pub struct PlaybackContext<O: OutputDevice> {
    pub scheduler: PlaybackScheduler<O>,
    pub inbound: Receiver<WireChunk>,
    pub running: Arc<AtomicBool>,
    pub speaking_tx: broadcast::Sender<SpeakingEvent>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<SessionDiagnostics>,
}

/// Run until `ctx.running` clears, or until the inbound side hangs up and the
/// queued audio has drained. Returns the scheduler for inspection; a stopped
/// session hands it back already reset.
pub fn run<O: OutputDevice>(mut ctx: PlaybackContext<O>) -> PlaybackScheduler<O> {
    info!("playback loop started");
    let mut inbound_open = true;

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            if ctx.scheduler.is_speaking() {
                emit_speaking(&ctx, false);
            }
            ctx.scheduler.reset();
            break;
        }

        if inbound_open {
            match ctx.inbound.recv_timeout(TICK) {
                Ok(chunk) => handle_chunk(&mut ctx, &chunk),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("inbound closed, draining scheduled audio");
                    inbound_open = false;
                }
            }
        } else {
            std::thread::sleep(TICK);
        }

        if ctx.scheduler.tick() == Some(false) {
            emit_speaking(&ctx, false);
        }

        if !inbound_open && !ctx.scheduler.is_speaking() {
            break;
        }
    }

    info!(
        next_start_time = ctx.scheduler.next_start_time(),
        "playback loop finished"
    );
    ctx.scheduler
}

fn handle_chunk<O: OutputDevice>(ctx: &mut PlaybackContext<O>, chunk: &WireChunk) {
    ctx.diagnostics
        .chunks_received
        .fetch_add(1, Ordering::Relaxed);

    match ctx.scheduler.submit(chunk) {
        Ok(scheduled) => {
            ctx.diagnostics
                .segments_scheduled
                .fetch_add(1, Ordering::Relaxed);
            debug!(end_at = scheduled.end_at(), "inbound segment queued");
            if scheduled.started_speaking {
                emit_speaking(ctx, true);
            }
        }
        Err(e) if e.is_chunk_local() => {
            ctx.diagnostics.chunks_rejected.fetch_add(1, Ordering::Relaxed);
            warn!("dropping inbound chunk: {e}");
        }
        Err(e) => {
            ctx.diagnostics.chunks_rejected.fetch_add(1, Ordering::Relaxed);
            error!("output device refused segment: {e}");
        }
    }
}

fn emit_speaking<O: OutputDevice>(ctx: &PlaybackContext<O>, speaking: bool) {
    let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
    debug!(seq, speaking, "speaking changed");
    let _ = ctx.speaking_tx.send(SpeakingEvent { seq, speaking });
}
