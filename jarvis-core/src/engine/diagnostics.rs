//! Per-session counters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::capture::CaptureStats;

#[derive(Debug, Default)]
pub struct SessionDiagnostics {
    pub capture: Arc<CaptureStats>,
    pub chunks_received: AtomicUsize,
    pub segments_scheduled: AtomicUsize,
    pub chunks_rejected: AtomicUsize,
}

impl SessionDiagnostics {
    pub fn reset(&self) {
        self.capture.blocks_encoded.store(0, Ordering::Relaxed);
        self.capture.chunks_sent.store(0, Ordering::Relaxed);
        self.capture.chunks_dropped.store(0, Ordering::Relaxed);
        self.chunks_received.store(0, Ordering::Relaxed);
        self.segments_scheduled.store(0, Ordering::Relaxed);
        self.chunks_rejected.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            blocks_captured: self.capture.blocks_encoded.load(Ordering::Relaxed),
            chunks_sent: self.capture.chunks_sent.load(Ordering::Relaxed),
            chunks_dropped: self.capture.chunks_dropped.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            segments_scheduled: self.segments_scheduled.load(Ordering::Relaxed),
            chunks_rejected: self.chunks_rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticsSnapshot {
    pub blocks_captured: usize,
    pub chunks_sent: usize,
    pub chunks_dropped: usize,
    pub chunks_received: usize,
    pub segments_scheduled: usize,
    pub chunks_rejected: usize,
}
