//! `VoiceEngine`: live session lifecycle.
//!
//! ## Lifecycle
//!
//! ```text
//! VoiceEngine::new()
//!     └─► start()   → output opened (fatal on failure), capture opened
//!         │           (non-fatal), status = Live
//!         └─► stop() → session flag cleared, both loops exit, status = Stopped
//! ```
//!
//! `start()`/`stop()` in the wrong state return an error rather than
//! panicking. Each `start()` builds a fresh `PlaybackScheduler` and a fresh
//! stop flag, so nothing from one session (cursor or threads) survives into
//! the next, however quickly `start()` follows `stop()`.
//!
//! If the transport drops its inbound sender, playback drains and the session
//! ends by itself with status `Stopped`.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send`. The output stream and the microphone stream are
//! each opened *inside* their own `spawn_blocking` closure and dropped there.
//! A sync oneshot channel carries the output open result back to `start()`.

pub mod capture_loop;
pub mod diagnostics;
pub mod playback_loop;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    audio::{AudioCapture, CpalOutput},
    buffering::create_audio_ring,
    error::{JarvisError, Result},
    ipc::events::{EngineStatus, EngineStatusEvent, SpeakingEvent},
    playback::{PlaybackScheduler, DEFAULT_SPEAKING_GRACE},
    wire::{WireChunk, CAPTURE_BLOCK_SIZE, CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE},
};

pub use diagnostics::{DiagnosticsSnapshot, SessionDiagnostics};

/// Broadcast channel capacity for status and speaking events.
const BROADCAST_CAP: usize = 64;

/// Configuration for `VoiceEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Outbound wire rate (Hz). Default: 16000.
    pub capture_sample_rate: u32,
    /// Inbound wire rate (Hz), also the preferred output stream rate.
    /// Default: 24000.
    pub playback_sample_rate: u32,
    /// Samples per outbound chunk. Default: 4096.
    pub capture_block_size: usize,
    /// How long the speaking flag holds after the last segment. Default: 500 ms.
    pub speaking_grace: Duration,
    /// Outbound queue depth before chunks are dropped. Default: 64.
    pub outbound_capacity: usize,
    /// Inbound queue depth. Default: 64.
    pub inbound_capacity: usize,
    /// Microphone by name; `None` uses the system default.
    pub preferred_input_device: Option<String>,
    /// Speaker by name; `None` uses the system default.
    pub preferred_output_device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: CAPTURE_SAMPLE_RATE,
            playback_sample_rate: PLAYBACK_SAMPLE_RATE,
            capture_block_size: CAPTURE_BLOCK_SIZE,
            speaking_grace: DEFAULT_SPEAKING_GRACE,
            outbound_capacity: 64,
            inbound_capacity: 64,
            preferred_input_device: None,
            preferred_output_device: None,
        }
    }
}

/// Channel ends handed to the transport for one live session.
pub struct LiveSession {
    /// Encoded microphone chunks to forward to the remote model.
    pub outbound: Receiver<WireChunk>,
    /// Push model speech chunks here, in arrival order.
    pub inbound: Sender<WireChunk>,
}

/// Shared status cell plus its broadcast channel.
#[derive(Clone)]
struct StatusReporter {
    status: Arc<Mutex<EngineStatus>>,
    tx: broadcast::Sender<EngineStatusEvent>,
}

impl StatusReporter {
    fn set(&self, status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = status;
        let _ = self.tx.send(EngineStatusEvent { status, detail });
    }
}

/// Holds the stop flag of the current session.
///
/// Every session gets its own flag; the loops of a session only ever watch
/// that flag, so clearing it can never be undone by a later `begin()`.
#[derive(Debug, Default)]
pub struct SessionSlot {
    active: Mutex<Option<Arc<AtomicBool>>>,
}

impl SessionSlot {
    /// Open a new session and return its stop flag.
    ///
    /// # Errors
    /// `JarvisError::AlreadyRunning` while the previous session is active.
    pub fn begin(&self) -> Result<Arc<AtomicBool>> {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|f| f.load(Ordering::SeqCst)) {
            return Err(JarvisError::AlreadyRunning);
        }
        let flag = Arc::new(AtomicBool::new(true));
        *active = Some(Arc::clone(&flag));
        Ok(flag)
    }

    /// Clear the current session's flag.
    ///
    /// # Errors
    /// `JarvisError::NotRunning` when no session is active.
    pub fn end(&self) -> Result<()> {
        let active = self.active.lock().take();
        match active {
            Some(flag) if flag.swap(false, Ordering::SeqCst) => Ok(()),
            _ => Err(JarvisError::NotRunning),
        }
    }

    /// Abort the session `begin()` just opened (setup failed).
    fn abandon(&self, flag: &AtomicBool) {
        flag.store(false, Ordering::SeqCst);
        self.active.lock().take();
    }

    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Top-level engine handle. `Send + Sync`; wrap in `Arc` to share.
pub struct VoiceEngine {
    config: EngineConfig,
    session: SessionSlot,
    status: StatusReporter,
    speaking_tx: broadcast::Sender<SpeakingEvent>,
    seq: Arc<AtomicU64>,
    diagnostics: Arc<SessionDiagnostics>,
}

impl VoiceEngine {
    pub fn new(config: EngineConfig) -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (speaking_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            session: SessionSlot::default(),
            status: StatusReporter {
                status: Arc::new(Mutex::new(EngineStatus::Idle)),
                tx: status_tx,
            },
            speaking_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(SessionDiagnostics::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a live session on the configured devices.
    ///
    /// Blocks until the output device is open. Must be called from within a
    /// Tokio runtime.
    ///
    /// # Errors
    /// - `JarvisError::AlreadyRunning` if a session is active.
    /// - Output device errors (`NoDefaultOutputDevice`, `AudioStream`, …);
    ///   these abort the session. Microphone errors do not: the session runs
    ///   playback-only and reports `EngineStatus::CaptureLost`.
    pub fn start(&self) -> Result<LiveSession> {
        let running = self.session.begin()?;
        self.diagnostics.reset();

        let (outbound_tx, outbound_rx) = bounded::<WireChunk>(self.config.outbound_capacity);
        let (inbound_tx, inbound_rx) = bounded::<WireChunk>(self.config.inbound_capacity);

        if let Err(e) = self.spawn_playback(inbound_rx, Arc::clone(&running)) {
            self.session.abandon(&running);
            self.status.set(EngineStatus::Error, Some(e.to_string()));
            return Err(e);
        }

        self.status.set(EngineStatus::Live, None);
        self.spawn_capture(outbound_tx, running);
        info!("live session started");

        Ok(LiveSession {
            outbound: outbound_rx,
            inbound: inbound_tx,
        })
    }

    /// End the live session.
    ///
    /// # Errors
    /// `JarvisError::NotRunning` if no session is active.
    pub fn stop(&self) -> Result<()> {
        self.session.end()?;
        self.status.set(EngineStatus::Stopped, None);
        info!("live session stop requested");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.session.is_active()
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.status.lock()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status.tx.subscribe()
    }

    pub fn subscribe_speaking(&self) -> broadcast::Receiver<SpeakingEvent> {
        self.speaking_tx.subscribe()
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    fn spawn_playback(&self, inbound: Receiver<WireChunk>, running: Arc<AtomicBool>) -> Result<()> {
        let preferred = self.config.preferred_output_device.clone();
        let rate = self.config.playback_sample_rate;
        let grace = self.config.speaking_grace;
        let status = self.status.clone();
        let speaking_tx = self.speaking_tx.clone();
        let seq = Arc::clone(&self.seq);
        let diagnostics = Arc::clone(&self.diagnostics);

        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        tokio::task::spawn_blocking(move || {
            // Output stream must be created on this thread (cpal::Stream is !Send).
            let output = match CpalOutput::open(preferred.as_deref(), rate) {
                Ok(o) => {
                    let _ = open_tx.send(Ok(o.device_rate()));
                    o
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    return;
                }
            };

            playback_loop::run(playback_loop::PlaybackContext {
                scheduler: PlaybackScheduler::with_grace(output, rate, grace),
                inbound,
                running: Arc::clone(&running),
                speaking_tx,
                seq,
                diagnostics,
            });

            // Still set: the inbound side hung up rather than `stop()`.
            if running.swap(false, Ordering::SeqCst) {
                info!("inbound closed, live session ended");
                status.set(
                    EngineStatus::Stopped,
                    Some("inbound audio channel closed".into()),
                );
            }
            // Output stream drops here, on its own thread.
        });

        match open_rx.recv() {
            Ok(Ok(device_rate)) => {
                info!(device_rate, "playback device open");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(JarvisError::Other(anyhow::anyhow!(
                "playback task died before opening the device"
            ))),
        }
    }

    fn spawn_capture(&self, outbound: Sender<WireChunk>, running: Arc<AtomicBool>) {
        let preferred = self.config.preferred_input_device.clone();
        let wire_rate = self.config.capture_sample_rate;
        let block_size = self.config.capture_block_size;
        let stats = Arc::clone(&self.diagnostics.capture);
        let status = self.status.clone();

        tokio::task::spawn_blocking(move || {
            let (producer, consumer) = create_audio_ring();

            // Separate from `running` so a dead microphone never stops playback.
            let callback_active = Arc::new(AtomicBool::new(true));
            let capture = match AudioCapture::open(producer, callback_active, preferred.as_deref()) {
                Ok(c) => c,
                Err(e) => {
                    warn!("microphone unavailable, continuing playback-only: {e}");
                    status.set(EngineStatus::CaptureLost, Some(e.to_string()));
                    return;
                }
            };

            let exit = capture_loop::run(capture_loop::CaptureContext {
                consumer,
                running: Arc::clone(&running),
                device_fault: capture.fault_flag(),
                device_rate: capture.sample_rate,
                wire_rate,
                block_size,
                outbound,
                stats,
            });

            if let capture_loop::CaptureExit::Failed(reason) = exit {
                if running.load(Ordering::SeqCst) {
                    status.set(EngineStatus::CaptureLost, Some(reason));
                }
            }

            capture.stop();
            drop(capture);
        });
    }
}
