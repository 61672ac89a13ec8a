//! Capture-side buffering.
//!
//! The cpal input callback pushes mono f32 samples into a `ringbuf::HeapRb`
//! (wait-free `push_slice`). The capture loop drains it, resamples, and cuts
//! the stream into fixed-size blocks with [`BlockFramer`].

pub mod chunk;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Producer half, held by the audio callback thread.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the capture loop.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// 2^18 = 262 144 samples ≈ 5.4 s at 48 kHz. Live audio older than that is
/// useless to the model, so overflow drops instead of growing.
pub const RING_CAPACITY: usize = 1 << 18;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}

/// Re-slices an arbitrary sample stream into blocks of exactly `block_size`.
#[derive(Debug)]
pub struct BlockFramer {
    block_size: usize,
    pending: Vec<f32>,
}

impl BlockFramer {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size * 2),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Samples waiting for a full block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Append `samples` and call `on_block` once per completed block.
    pub fn push(&mut self, samples: &[f32], mut on_block: impl FnMut(&[f32])) {
        self.pending.extend_from_slice(samples);
        let full = self.pending.len() / self.block_size * self.block_size;
        if full == 0 {
            return;
        }
        for block in self.pending[..full].chunks_exact(self.block_size) {
            on_block(block);
        }
        self.pending.drain(..full);
    }

    /// Drop any partial block (session end).
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_round_trips_samples() {
        let (mut producer, mut consumer) = create_audio_ring();
        assert_eq!(producer.push_slice(&[0.1, 0.2, 0.3]), 3);
        let mut out = [0f32; 4];
        assert_eq!(consumer.pop_slice(&mut out), 3);
        assert_eq!(&out[..3], &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn framer_emits_only_whole_blocks() {
        let mut framer = BlockFramer::new(4);
        let mut blocks: Vec<Vec<f32>> = Vec::new();

        framer.push(&[1.0, 2.0, 3.0], |b| blocks.push(b.to_vec()));
        assert!(blocks.is_empty());
        assert_eq!(framer.pending(), 3);

        framer.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0], |b| blocks.push(b.to_vec()));
        assert_eq!(
            blocks,
            vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]
        );
        assert_eq!(framer.pending(), 1);

        framer.clear();
        assert_eq!(framer.pending(), 0);
    }
}
