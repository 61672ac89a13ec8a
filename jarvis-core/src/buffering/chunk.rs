//! Decoded audio segment handed to the playback scheduler.

/// A contiguous block of mono samples at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Mono f32 samples, nominally in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (16000 for capture, 24000 for model speech).
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds; zero for an empty chunk or a zero rate.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_rate() {
        assert_eq!(AudioChunk::new(vec![0.0; 24_000], 24_000).duration_secs(), 1.0);
        assert_eq!(AudioChunk::new(vec![0.0; 4096], 16_000).duration_secs(), 0.256);
        assert_eq!(AudioChunk::new(vec![0.0; 10], 0).duration_secs(), 0.0);
    }
}
