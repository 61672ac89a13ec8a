//! Outbound capture pipeline: sample block → PCM16 → base64 → sender.
//!
//! Hand-off to the transport is fire-and-forget. A full or closed outbound
//! queue drops the chunk on the spot; live audio is never retried.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};
use tracing::{debug, warn};

use crate::{
    codec::{pcm16, text},
    wire::{PcmDescriptor, WireChunk},
};

/// Result of handing one block to the outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Sent,
    /// Queue full or receiver gone; the chunk was discarded.
    Dropped,
}

/// Counters shared with the engine for observability.
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub blocks_encoded: AtomicUsize,
    pub chunks_sent: AtomicUsize,
    pub chunks_dropped: AtomicUsize,
}

/// Encodes capture blocks and pushes them to the outbound sender.
pub struct CapturePipeline {
    sink: Sender<WireChunk>,
    mime_type: String,
    scratch: Vec<u8>,
    stats: Arc<CaptureStats>,
}

impl CapturePipeline {
    pub fn new(sink: Sender<WireChunk>, sample_rate: u32) -> Self {
        Self::with_stats(sink, sample_rate, Arc::new(CaptureStats::default()))
    }

    pub fn with_stats(sink: Sender<WireChunk>, sample_rate: u32, stats: Arc<CaptureStats>) -> Self {
        Self {
            sink,
            mime_type: PcmDescriptor::with_rate(sample_rate).to_string(),
            scratch: Vec::new(),
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<CaptureStats> {
        &self.stats
    }

    /// Encode `block` and try to send it. Never blocks.
    pub fn process_block(&mut self, block: &[f32]) -> CaptureOutcome {
        pcm16::samples_to_pcm16_into(block, &mut self.scratch);
        let chunk = WireChunk {
            data: text::encode(&self.scratch),
            mime_type: self.mime_type.clone(),
        };
        self.stats.blocks_encoded.fetch_add(1, Ordering::Relaxed);

        match self.sink.try_send(chunk) {
            Ok(()) => {
                self.stats.chunks_sent.fetch_add(1, Ordering::Relaxed);
                CaptureOutcome::Sent
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.stats.chunks_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(dropped, "outbound queue full, dropping capture chunk");
                CaptureOutcome::Dropped
            }
            Err(TrySendError::Disconnected(_)) => {
                let dropped = self.stats.chunks_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 100 == 0 {
                    warn!(dropped, "outbound receiver gone, dropping capture chunks");
                }
                CaptureOutcome::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::CAPTURE_SAMPLE_RATE;
    use crossbeam_channel::bounded;

    #[test]
    fn sends_tagged_chunk() {
        let (tx, rx) = bounded(4);
        let mut pipeline = CapturePipeline::new(tx, CAPTURE_SAMPLE_RATE);

        assert_eq!(pipeline.process_block(&[0.5, -0.5]), CaptureOutcome::Sent);

        let chunk = rx.try_recv().expect("chunk should be queued");
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
        assert_eq!(chunk.data, "AEAAwA==");
        assert_eq!(pipeline.stats().chunks_sent.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let (tx, rx) = bounded(1);
        let mut pipeline = CapturePipeline::new(tx, CAPTURE_SAMPLE_RATE);

        assert_eq!(pipeline.process_block(&[0.1; 8]), CaptureOutcome::Sent);
        assert_eq!(pipeline.process_block(&[0.2; 8]), CaptureOutcome::Dropped);
        assert_eq!(rx.len(), 1);

        let stats = pipeline.stats();
        assert_eq!(stats.blocks_encoded.load(Ordering::Relaxed), 2);
        assert_eq!(stats.chunks_dropped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn closed_receiver_drops() {
        let (tx, rx) = bounded(4);
        drop(rx);
        let mut pipeline = CapturePipeline::new(tx, CAPTURE_SAMPLE_RATE);
        assert_eq!(pipeline.process_block(&[0.0; 4]), CaptureOutcome::Dropped);
    }
}
